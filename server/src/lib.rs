//! # Arena Server Library
//!
//! Authoritative side of the arena: it keeps the registry of in-game players
//! and pushes the full roster to every connected client whenever it changes.
//!
//! ## Module Organization
//!
//! ### Registry (`registry`)
//! The only state shared between connections. Live connections and in-game
//! players sit behind a single lock. No network I/O happens while the lock
//! is held.
//!
//! ### Broadcast (`broadcast`)
//! Serializes one roster document per change and places it in every live
//! connection's outbound slot under the registry lock. Each slot keeps only
//! the newest roster, and a closed slot only affects its own peer.
//!
//! ### Handler (`handler`)
//! One task per accepted connection. It decodes frames into player reports,
//! applies them to the registry and triggers broadcasts. Malformed frames or
//! messages are skipped; a closed or reset link removes the player.
//!
//! ### Network (`network`)
//! Listener setup with port scanning, the accept loop and cooperative
//! shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod handler;
pub mod network;
pub mod registry;
