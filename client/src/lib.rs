//! # Arena Client Library
//!
//! Client side of the arena: it keeps a local player, sends its position on
//! every move, and mirrors the roster the server broadcasts. Rendering and
//! key handling live outside this crate; they drive the client through move
//! intents and read back the local player and the remote roster.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The [`network::SyncClient`] and its reconnect state machine:
//! - address validation before any connection attempt
//! - connect with timeout, exponential backoff between attempts
//! - background receive loop replacing the mirror roster on each update
//! - re-announcing the local player after a reconnect
//!
//! ### Game Module (`game`)
//! Local player lifecycle (join, move, leave) and the mirror roster.
//!
//! ### Input Module (`input`)
//! Text commands that stand in for keyboard controls in the terminal client.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{ClientConfig, ConnectionStatus, SyncClient};
//! use shared::Direction;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SyncClient::spawn(ClientConfig {
//!         server: "192.168.1.5:10002".to_string(),
//!         ..ClientConfig::default()
//!     });
//!
//!     let mut status = client.subscribe_status();
//!     status.wait_for(|s| *s == ConnectionStatus::Connected).await?;
//!
//!     client.join().await?;
//!     client.move_player(Direction::Right).await?;
//!
//!     for player in client.remote_players().await {
//!         println!("#{} at ({}, {}) in {}", player.id, player.x, player.y, player.color);
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
