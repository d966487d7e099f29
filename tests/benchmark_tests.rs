//! Performance benchmarks for the hot paths of the arena protocol
//!
//! Bounds are loose enough for unoptimized test builds.

use server::broadcast::broadcast_all;
use server::registry::Registry;
use shared::{color_for, decode_roster, encode_roster, framing, read_frame, PlayerState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_test::io::Builder;

fn roster_of(count: u64) -> Vec<PlayerState> {
    (0..count)
        .map(|id| PlayerState::new(id, (id % 600) as i32, (id % 400) as i32, true))
        .collect()
}

/// Benchmarks frame encoding of a typical player update
#[test]
fn benchmark_frame_encode() {
    let payload = PlayerState::new(1_700_000_000_000, 120, 80, true)
        .to_json()
        .unwrap();

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = framing::encode(&payload).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Frame encode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks reading a long run of frames delivered in uneven chunks
#[tokio::test]
async fn benchmark_frame_decode_stream() {
    let payload = PlayerState::new(42, 10, 10, true).to_json().unwrap();
    let frame = framing::encode(&payload).unwrap();

    let frames = 20_000;
    let mut buffer = Vec::with_capacity(frame.len() * frames);
    for _ in 0..frames {
        buffer.extend_from_slice(&frame);
    }

    let mut builder = Builder::new();
    for chunk in buffer.chunks(1500) {
        builder.read(chunk);
    }
    let mut reader = builder.build();
    let start = Instant::now();

    for _ in 0..frames {
        let decoded = read_frame(&mut reader).await.unwrap();
        assert_eq!(decoded.len(), payload.len());
    }

    let duration = start.elapsed();
    println!(
        "Frame decode: {} frames in {:?} ({:.2} μs/frame)",
        frames,
        duration,
        duration.as_micros() as f64 / frames as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks palette color derivation
#[test]
fn benchmark_color_for() {
    let iterations = 100_000u64;
    let start = Instant::now();

    for id in 0..iterations {
        let _ = color_for(id);
    }

    let duration = start.elapsed();
    println!(
        "Color derivation: {} ids in {:?} ({:.2} ns/id)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Benchmarks roster encoding and decoding for a crowded arena
#[test]
fn benchmark_roster_round_trip() {
    let players = roster_of(100);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let encoded = encode_roster(&players).unwrap();
        let decoded = decode_roster(&encoded).unwrap();
        assert_eq!(decoded.len(), players.len());
    }

    let duration = start.elapsed();
    println!(
        "Roster round trip (100 players): {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks registry updates and broadcasts with many connections
#[tokio::test]
async fn benchmark_registry_broadcast() {
    let registry = Arc::new(Registry::new());
    let addr: SocketAddr = "127.0.0.1:50000".parse().unwrap();

    let mut slots = Vec::new();
    let mut connections = Vec::new();
    for _ in 0..50 {
        let (tx, rx) = watch::channel(None);
        connections.push(registry.register(addr, tx).await);
        slots.push(rx);
    }

    let rounds = 200;
    let start = Instant::now();

    for round in 0..rounds {
        for (index, connection) in connections.iter().enumerate() {
            let player = PlayerState::new(index as u64, round % 600, 10, true);
            registry.upsert(*connection, player).await;
        }
        let report = broadcast_all(&registry).await;
        assert_eq!(report.delivered, connections.len());

        for slot in slots.iter_mut() {
            assert!(slot.borrow_and_update().is_some());
        }
    }

    let duration = start.elapsed();
    println!(
        "Registry: {} rounds of 50 upserts + broadcast in {:?} ({:.2} μs/round)",
        rounds,
        duration,
        duration.as_micros() as f64 / rounds as f64
    );

    assert_eq!(registry.player_count().await, 50);
    assert!(duration.as_millis() < 10_000);
}
