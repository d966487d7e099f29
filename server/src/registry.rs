//! Authoritative player registry for the arena server
//!
//! The registry tracks two things behind one lock:
//! - every live connection, with its peer address and outbound roster slot
//! - every in-game player, keyed by player id and tied to the connection
//!   that last reported it
//!
//! A player is present only while its most recent report says `in_game`.
//! Broadcasts read the roster and fill every outbound slot under the same
//! lock, so the last frame each peer is handed always matches the newest
//! registry state. Filling a slot never touches a socket; the writer tasks
//! do the network I/O after the lock is released.

use log::{debug, info};
use shared::{PlayerId, PlayerState};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Server-assigned handle for one accepted connection
pub type ConnectionId = u64;

/// An encoded frame, shared between all the slots it is broadcast to
pub type Frame = Arc<[u8]>;

/// Latest-value slot drained by a connection's writer task
///
/// A roster the writer has not picked up yet is replaced by the next one,
/// so a slow peer skips stale rosters but always ends on the newest.
pub type Outbound = watch::Sender<Option<Frame>>;

/// A live connection the broadcaster can deliver frames to
#[derive(Debug)]
pub struct Connection {
    /// Peer address, for logging before any player state arrives
    pub addr: SocketAddr,
    pub outbound: Outbound,
}

#[derive(Debug)]
struct Entry {
    connection: ConnectionId,
    state: PlayerState,
}

/// Effect of an [`Registry::upsert`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Inserted,
    Updated,
    Removed,
    Unchanged,
}

/// Point-in-time copy of the registry taken under the lock
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// In-game players ordered by id
    pub players: Vec<PlayerState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Connection>,
    players: BTreeMap<PlayerId, Entry>,
    next_connection_id: ConnectionId,
}

impl RegistryState {
    fn roster(&self) -> Vec<PlayerState> {
        self.players.values().map(|entry| entry.state.clone()).collect()
    }
}

/// Shared registry owned by the server and handed to each handler
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly accepted connection and returns its handle
    pub async fn register(&self, addr: SocketAddr, outbound: Outbound) -> ConnectionId {
        let mut state = self.state.lock().await;
        state.next_connection_id += 1;
        let id = state.next_connection_id;
        state.connections.insert(id, Connection { addr, outbound });
        debug!("Registered connection {} from {}", id, addr);
        id
    }

    /// Forgets a connection along with every player it last reported
    ///
    /// Returns the players that were removed.
    pub async fn unregister(&self, connection: ConnectionId) -> Vec<PlayerState> {
        let mut state = self.state.lock().await;
        state.connections.remove(&connection);

        let owned: Vec<PlayerId> = state
            .players
            .iter()
            .filter(|(_, entry)| entry.connection == connection)
            .map(|(id, _)| *id)
            .collect();

        owned
            .into_iter()
            .filter_map(|id| state.players.remove(&id))
            .map(|entry| {
                info!("Player #{} removed with connection {}", entry.state.id, connection);
                entry.state
            })
            .collect()
    }

    /// Applies a player report received on `connection`
    ///
    /// An in-game report inserts or overwrites the entry for its id; any
    /// other report removes that id.
    pub async fn upsert(&self, connection: ConnectionId, player: PlayerState) -> Mutation {
        let mut state = self.state.lock().await;

        if !player.in_game {
            return match state.players.remove(&player.id) {
                Some(_) => {
                    info!("Player #{} left the game", player.id);
                    Mutation::Removed
                }
                None => Mutation::Unchanged,
            };
        }

        let id = player.id;
        let previous = state.players.insert(
            id,
            Entry {
                connection,
                state: player,
            },
        );

        match previous {
            Some(_) => Mutation::Updated,
            None => {
                info!("Player #{} joined on connection {}", id, connection);
                Mutation::Inserted
            }
        }
    }

    /// Removes the entry for `id`, if any
    pub async fn remove(&self, id: PlayerId) -> Option<PlayerState> {
        let mut state = self.state.lock().await;
        state.players.remove(&id).map(|entry| entry.state)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        Snapshot {
            players: state.roster(),
        }
    }

    /// Runs `f` on the current roster and every live connection without
    /// releasing the lock in between
    ///
    /// `f` must not wait on the network; it is meant for handing frames to
    /// outbound slots.
    pub async fn with_roster<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[PlayerState], &HashMap<ConnectionId, Connection>) -> R,
    {
        let state = self.state.lock().await;
        let players = state.roster();
        f(&players, &state.connections)
    }

    pub async fn contains(&self, id: PlayerId) -> bool {
        self.state.lock().await.players.contains_key(&id)
    }

    pub async fn player_count(&self) -> usize {
        self.state.lock().await.players.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Peer address of a live connection
    pub async fn peer_addr(&self, connection: ConnectionId) -> Option<SocketAddr> {
        self.state
            .lock()
            .await
            .connections
            .get(&connection)
            .map(|c| c.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:10002".parse().unwrap()
    }

    fn slot() -> Outbound {
        watch::channel(None).0
    }

    fn player(id: PlayerId, in_game: bool) -> PlayerState {
        PlayerState::new(id, 10, 10, in_game)
    }

    #[tokio::test]
    async fn test_register_assigns_distinct_ids() {
        let registry = Registry::new();
        let a = registry.register(test_addr(), slot()).await;
        let b = registry.register(test_addr(), slot()).await;

        assert_ne!(a, b);
        assert_eq!(registry.connection_count().await, 2);
        assert_eq!(registry.peer_addr(a).await, Some(test_addr()));
    }

    #[tokio::test]
    async fn test_upsert_inserts_and_updates() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;

        assert_eq!(registry.upsert(conn, player(1000, true)).await, Mutation::Inserted);

        let mut moved = player(1000, true);
        moved.x = 50;
        assert_eq!(registry.upsert(conn, moved).await, Mutation::Updated);

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].x, 50);
    }

    #[tokio::test]
    async fn test_upsert_not_in_game_removes() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;

        registry.upsert(conn, player(1000, true)).await;
        assert_eq!(registry.upsert(conn, player(1000, false)).await, Mutation::Removed);
        assert!(!registry.contains(1000).await);

        // Leaving twice is harmless
        assert_eq!(registry.upsert(conn, player(1000, false)).await, Mutation::Unchanged);
    }

    #[tokio::test]
    async fn test_first_report_not_in_game_creates_nothing() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;

        assert_eq!(registry.upsert(conn, player(7, false)).await, Mutation::Unchanged);
        assert_eq!(registry.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;
        registry.upsert(conn, player(5, true)).await;

        assert_eq!(registry.remove(5).await.map(|p| p.id), Some(5));
        assert!(registry.remove(5).await.is_none());
        assert_eq!(registry.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_owned_players_only() {
        let registry = Registry::new();
        let a = registry.register(test_addr(), slot()).await;
        let b = registry.register(test_addr(), slot()).await;

        registry.upsert(a, player(1, true)).await;
        registry.upsert(b, player(2, true)).await;

        let removed = registry.unregister(a).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, 1);

        assert!(!registry.contains(1).await);
        assert!(registry.contains(2).await);
        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.peer_addr(a).await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_without_player() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;

        assert!(registry.unregister(conn).await.is_empty());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_ordered_by_id() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;

        for id in [30, 10, 20] {
            registry.upsert(conn, player(id, true)).await;
        }

        let snapshot = registry.snapshot().await;
        let ids: Vec<PlayerId> = snapshot.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_with_roster_sees_connections_and_players() {
        let registry = Registry::new();
        let a = registry.register(test_addr(), slot()).await;
        registry.register(test_addr(), slot()).await;
        registry.upsert(a, player(3, true)).await;

        let (players, connections) = registry
            .with_roster(|players, connections| (players.len(), connections.len()))
            .await;
        assert_eq!(players, 1);
        assert_eq!(connections, 2);
    }

    #[tokio::test]
    async fn test_contents_follow_latest_in_game_flag() {
        let registry = Registry::new();
        let conn = registry.register(test_addr(), slot()).await;

        let ops: [(PlayerId, bool); 9] = [
            (1, true),
            (2, true),
            (3, true),
            (2, false),
            (1, true),
            (3, false),
            (4, false),
            (3, true),
            (1, false),
        ];

        let mut latest: HashMap<PlayerId, bool> = HashMap::new();
        for (id, in_game) in ops {
            registry.upsert(conn, player(id, in_game)).await;
            latest.insert(id, in_game);
        }

        let expected: HashSet<PlayerId> = latest
            .into_iter()
            .filter(|(_, in_game)| *in_game)
            .map(|(id, _)| id)
            .collect();

        let snapshot = registry.snapshot().await;
        let present: HashSet<PlayerId> = snapshot.players.iter().map(|p| p.id).collect();
        assert_eq!(present, expected);
        assert!(snapshot.players.iter().all(|p| p.in_game));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_are_not_lost() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();

        for task in 0..8u64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let conn = registry.register(test_addr(), slot()).await;
                for i in 0..50u64 {
                    let id = task * 1000 + i;
                    registry.upsert(conn, player(id, true)).await;
                    // Interleave snapshots with writers
                    let snapshot = registry.snapshot().await;
                    assert!(snapshot.players.iter().all(|p| p.in_game));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.player_count().await, 8 * 50);
        let snapshot = registry.snapshot().await;
        for task in 0..8u64 {
            for i in 0..50u64 {
                assert!(snapshot.players.iter().any(|p| p.id == task * 1000 + i));
            }
        }
    }
}
