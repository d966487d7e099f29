//! Roster fan-out to every live connection

use crate::registry::{Connection, ConnectionId, Frame, Registry};
use log::{debug, error};
use shared::{encode_roster, framing, PlayerState};
use std::collections::HashMap;

/// Outcome of one broadcast pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Players included in the roster
    pub players: usize,
    /// Connections whose slot now holds this roster
    pub delivered: usize,
    /// Connections whose writer has already stopped
    pub dropped: usize,
}

/// Sends the current roster, framed, to every live connection
///
/// The roster is read and handed to every outbound slot under one registry
/// lock, so concurrent broadcasts can never leave a peer holding an older
/// roster than the registry. A slot replaces any roster its writer has not
/// picked up yet, and a stopped writer only affects its own peer.
pub async fn broadcast_all(registry: &Registry) -> BroadcastReport {
    registry.with_roster(fan_out).await
}

fn fan_out(
    players: &[PlayerState],
    connections: &HashMap<ConnectionId, Connection>,
) -> BroadcastReport {
    let mut report = BroadcastReport {
        players: players.len(),
        ..Default::default()
    };

    let frame: Frame = match encode_roster(players).and_then(|doc| framing::encode(&doc)) {
        Ok(frame) => frame.into(),
        Err(e) => {
            error!("Failed to encode roster of {} players: {}", report.players, e);
            return report;
        }
    };

    for (connection_id, connection) in connections {
        match connection.outbound.send(Some(Frame::clone(&frame))) {
            Ok(()) => report.delivered += 1,
            Err(_) => {
                debug!(
                    "Connection {} ({}) already closed, skipping roster",
                    connection_id, connection.addr
                );
                report.dropped += 1;
            }
        }
    }

    debug!(
        "Broadcast {} players to {} connections ({} dropped)",
        report.players, report.delivered, report.dropped
    );
    report
}
