//! Player records and their JSON wire form
//!
//! A player's display color is never sent. Both ends derive it from the
//! identifier with [`color_for`], which gives the same answer in every
//! process.

use crate::error::ProtocolError;
use crate::{ARENA_HEIGHT, ARENA_WIDTH, DOT_SIZE, MOVE_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unique player identifier: creation time in milliseconds since the epoch
pub type PlayerId = u64;

/// Fixed display palette, indexed by [`color_for`]
pub const PALETTE: [&str; 20] = [
    "#C62828", "#AD1457", "#6A1B9A", "#4527A0", "#283593", "#1565C0", "#0277BD", "#00838F",
    "#00695C", "#2E7D32", "#558B2F", "#9E9D24", "#F9A825", "#FF8F00", "#EF6C00", "#D84315",
    "#4E342E", "#616161", "#546E7A", "#000000",
];

/// Picks the display color for a player identifier
///
/// A generator seeded with `id` chooses the palette index, so the mapping is
/// stable across runs and machines. Distinct ids may share a color.
pub fn color_for(id: PlayerId) -> &'static str {
    let mut rng = StdRng::seed_from_u64(id);
    PALETTE[rng.gen_range(0..PALETTE.len())]
}

static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Allocates a fresh player identifier from the wall clock
///
/// Identifiers handed out by one process are strictly increasing even when
/// two are requested within the same millisecond.
pub fn next_player_id() -> PlayerId {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    let now = now.min(u64::MAX as u128) as u64;

    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// A single move intent from the input layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    fn delta(self) -> (i32, i32) {
        match self {
            Direction::Left => (-MOVE_SIZE, 0),
            Direction::Right => (MOVE_SIZE, 0),
            Direction::Up => (0, -MOVE_SIZE),
            Direction::Down => (0, MOVE_SIZE),
        }
    }
}

/// Exact JSON shape of one player on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePlayer {
    pub x: i32,
    pub y: i32,
    pub id: PlayerId,
    pub in_game: bool,
}

/// Server-to-client roster document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMessage {
    pub players: Vec<WirePlayer>,
}

/// A player's position and status, plus its derived color
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub in_game: bool,
    pub color: &'static str,
}

impl PlayerState {
    pub fn new(id: PlayerId, x: i32, y: i32, in_game: bool) -> Self {
        Self {
            id,
            x,
            y,
            in_game,
            color: color_for(id),
        }
    }

    /// Creates a player at a random position inside the arena margins
    pub fn spawn(id: PlayerId) -> Self {
        let mut rng = rand::thread_rng();
        let x = rng.gen_range(DOT_SIZE..=ARENA_WIDTH - DOT_SIZE);
        let y = rng.gen_range(DOT_SIZE..=ARENA_HEIGHT - DOT_SIZE);
        Self::new(id, x, y, true)
    }

    /// Applies one move intent
    ///
    /// The move only happens when the dot stays strictly more than
    /// `DOT_SIZE / 2` away from every edge. Returns whether the position
    /// changed.
    pub fn step(&mut self, direction: Direction) -> bool {
        let (dx, dy) = direction.delta();
        let (x, y) = (self.x + dx, self.y + dy);
        let margin = DOT_SIZE / 2;

        let inside_x = x > margin && x < ARENA_WIDTH - margin;
        let inside_y = y > margin && y < ARENA_HEIGHT - margin;
        if (dx != 0 && !inside_x) || (dy != 0 && !inside_y) {
            return false;
        }

        self.x = x;
        self.y = y;
        true
    }

    pub fn to_wire(&self) -> WirePlayer {
        WirePlayer {
            x: self.x,
            y: self.y,
            id: self.id,
            in_game: self.in_game,
        }
    }

    pub fn from_wire(wire: WirePlayer) -> Self {
        Self::new(wire.id, wire.x, wire.y, wire.in_game)
    }

    /// Serializes this player as a client-to-server JSON payload
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(&self.to_wire())?)
    }

    /// Parses a client-to-server JSON payload
    pub fn from_json(payload: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WirePlayer = serde_json::from_slice(payload)?;
        Ok(Self::from_wire(wire))
    }
}

/// Serializes a roster snapshot as `{"players": [...]}`
pub fn encode_roster(players: &[PlayerState]) -> Result<Vec<u8>, ProtocolError> {
    let message = RosterMessage {
        players: players.iter().map(PlayerState::to_wire).collect(),
    };
    Ok(serde_json::to_vec(&message)?)
}

/// Parses a `{"players": [...]}` document into player states
pub fn decode_roster(payload: &[u8]) -> Result<Vec<PlayerState>, ProtocolError> {
    let message: RosterMessage = serde_json::from_slice(payload)?;
    Ok(message
        .players
        .into_iter()
        .map(PlayerState::from_wire)
        .collect())
}
