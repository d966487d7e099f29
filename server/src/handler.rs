//! Per-connection read loop
//!
//! ```text
//! AwaitingFirstMessage ──in_game──▶ Active ──leave / close──▶ Terminated
//!          └──────────────leave / close──────────────────────────▲
//! ```
//!
//! Each handler owns the read half of its socket. The write half belongs to a
//! writer task that sends whatever roster is newest in the connection's
//! outbound slot, so broadcasts from other handlers never wait on this peer.

use crate::broadcast::broadcast_all;
use crate::network::ServerConfig;
use crate::registry::{ConnectionId, Frame, Registry};
use log::{debug, info, warn};
use shared::{read_frame, PlayerId, PlayerState, ProtocolError};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::timeout;

/// Lifecycle of a connection handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    AwaitingFirstMessage,
    Active { player_id: PlayerId },
    Terminated,
}

pub struct ConnectionHandler {
    registry: Arc<Registry>,
    config: ServerConfig,
    state: HandlerState,
}

impl ConnectionHandler {
    pub fn new(registry: Arc<Registry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config,
            state: HandlerState::AwaitingFirstMessage,
        }
    }

    /// Serves one connection until the peer leaves, the link fails, or the
    /// shutdown flag is raised. Returns the final state.
    pub async fn run<S>(
        mut self,
        stream: S,
        addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> HandlerState
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = watch::channel::<Option<Frame>>(None);
        let connection = self.registry.register(addr, outbound_tx).await;
        let mut writer_task = tokio::spawn(write_loop(
            writer,
            outbound_rx,
            self.config.write_timeout,
            connection,
        ));

        info!("Got connection {} from {}", connection, addr);

        loop {
            if *shutdown.borrow() {
                debug!("Connection {} stopping for shutdown", connection);
                break;
            }

            let frame = tokio::select! {
                result = next_frame(&mut reader, self.config.read_timeout) => result,
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                _ = &mut writer_task => Err(ProtocolError::ConnectionClosed),
            };

            let payload = match frame {
                Ok(payload) => payload,
                Err(e) if !e.is_fatal() => {
                    warn!("Discarding frame from {}: {}", addr, e);
                    continue;
                }
                Err(e) => {
                    self.log_disconnect(addr, &e);
                    break;
                }
            };

            let player = match PlayerState::from_json(&payload) {
                Ok(player) => player,
                Err(e) => {
                    warn!("Discarding message from {}: {}", addr, e);
                    continue;
                }
            };

            if player.in_game {
                self.registry.upsert(connection, player.clone()).await;
                self.state = HandlerState::Active {
                    player_id: player.id,
                };
                broadcast_all(&self.registry).await;
            } else {
                info!("Player #{} disconnected", player.id);
                self.registry.remove(player.id).await;
                broadcast_all(&self.registry).await;
                break;
            }
        }

        // Dropping the registry's slot sender lets the writer flush and close
        let removed = self.registry.unregister(connection).await;
        if !removed.is_empty() {
            broadcast_all(&self.registry).await;
        }

        self.state = HandlerState::Terminated;
        self.state
    }

    fn log_disconnect(&self, addr: SocketAddr, reason: &ProtocolError) {
        match self.state {
            HandlerState::Active { player_id } => {
                info!("Player #{} disconnected ({})", player_id, reason)
            }
            _ => info!("{} disconnected ({})", addr, reason),
        }
    }
}

async fn next_frame<R>(reader: &mut R, read_timeout: Option<Duration>) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match read_timeout {
        Some(limit) => timeout(limit, read_frame(reader)).await?,
        None => read_frame(reader).await,
    }
}

/// Writes the newest roster from `outbound` each time it changes, until the
/// slot closes or a write fails
///
/// A roster still unwritten when the slot closes is sent before the socket
/// is shut down.
async fn write_loop<W>(
    mut writer: W,
    mut outbound: watch::Receiver<Option<Frame>>,
    write_timeout: Option<Duration>,
    connection: ConnectionId,
) where
    W: AsyncWrite + Unpin,
{
    while outbound.changed().await.is_ok() {
        let latest = outbound.borrow_and_update().clone();
        let Some(frame) = latest else {
            continue;
        };

        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };

        let result = match write_timeout {
            Some(limit) => timeout(limit, write)
                .await
                .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
            None => write.await,
        };

        if let Err(e) = result {
            debug!("Write to connection {} failed: {}", connection, e);
            return;
        }
    }

    let _ = writer.shutdown().await;
}
