//! Client connection state machine and roster sync
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Connected
//!      ▲               │              │
//!      └── backoff ◀───┴──── failure ◀┘
//! ```
//!
//! A background task owns the read half of the socket and keeps the mirror
//! roster current. Sends happen on the caller's task through the write half.
//! A failed send drops the link right away instead of waiting for the next
//! read to fail.

use crate::game::ClientGameState;
use log::{debug, info, warn};
use shared::{
    decode_roster, local_ip, parse_server_address, read_frame, write_frame, Direction,
    PlayerState, ProtocolError, DEFAULT_PORT,
};
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Connection status exposed to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// The configured address is malformed; waiting for a new one
    InvalidAddress,
}

/// Runtime settings for the sync client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address as `A.B.C.D:PORT`
    pub server: String,
    pub connect_timeout: Duration,
    /// Reconnect when the server sends nothing for this long
    pub read_timeout: Option<Duration>,
    pub write_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("{}:{}", local_ip(), DEFAULT_PORT),
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_millis(250),
            backoff_max: Duration::from_secs(8),
        }
    }
}

/// Exponential delay between reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay to wait now; each call doubles the following one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Why a connected session ended
#[derive(Debug)]
enum LinkEnd {
    Failed(ProtocolError),
    SendFailed,
    AddressChanged,
    Shutdown,
}

/// Write half of the current connection plus the signal that aborts its reader
struct Link {
    writer: OwnedWriteHalf,
    abort: Arc<Notify>,
}

struct Inner {
    config: ClientConfig,
    address: watch::Sender<String>,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    game: RwLock<ClientGameState>,
    link: Mutex<Option<Link>>,
}

impl Inner {
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    /// Frames and sends one player state on the current connection
    async fn send_state(&self, player: &PlayerState) -> Result<(), ProtocolError> {
        let payload = player.to_json()?;
        let mut link = self.link.lock().await;
        let active = link.as_mut().ok_or(ProtocolError::ConnectionClosed)?;

        let result = match timeout(
            self.config.write_timeout,
            write_frame(&mut active.writer, &payload),
        )
        .await
        {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("Send failed, dropping connection: {}", e);
                active.abort.notify_one();
                *link = None;
            }
        }
        result
    }
}

/// Keeps a local player and a mirror roster in sync with an arena server
pub struct SyncClient {
    inner: Arc<Inner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncClient {
    /// Starts the background connect/receive task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Self {
        let (address, _) = watch::channel(config.server.clone());
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            address,
            status,
            shutdown,
            game: RwLock::new(ClientGameState::new()),
            link: Mutex::new(None),
        });

        let task = tokio::spawn(sync_loop(Arc::clone(&inner)));

        Self {
            inner,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn server_address(&self) -> String {
        self.inner.address.borrow().clone()
    }

    /// Points the client at a new server address
    ///
    /// A malformed address is rejected without touching the current
    /// connection. A valid one replaces the current connection.
    pub fn set_address(&self, text: &str) -> Result<SocketAddrV4, ProtocolError> {
        let addr = parse_server_address(text)?;
        self.inner.address.send_replace(text.to_string());
        Ok(addr)
    }

    /// Enters the arena and announces the local player
    ///
    /// The player is kept even if the send fails; it is announced again as
    /// soon as a connection is up.
    pub async fn join(&self) -> Result<PlayerState, ProtocolError> {
        let player = self.inner.game.write().await.join();
        info!("Joining as player #{} ({})", player.id, player.color);
        self.inner.send_state(&player).await?;
        Ok(player)
    }

    /// Leaves the arena; does nothing when not in game
    pub async fn leave(&self) -> Result<(), ProtocolError> {
        let Some(player) = self.inner.game.write().await.leave() else {
            return Ok(());
        };
        info!("Leaving as player #{}", player.id);
        self.inner.send_state(&player).await
    }

    /// Moves the local player and sends the new position
    ///
    /// Returns `Ok(false)` when there is no in-game player or the move would
    /// leave the arena.
    pub async fn move_player(&self, direction: Direction) -> Result<bool, ProtocolError> {
        let Some(player) = self.inner.game.write().await.apply_move(direction) else {
            return Ok(false);
        };
        self.inner.send_state(&player).await?;
        Ok(true)
    }

    pub async fn local_player(&self) -> Option<PlayerState> {
        self.inner.game.read().await.local_player().cloned()
    }

    /// Latest roster received from the server, as sent
    pub async fn roster(&self) -> Vec<PlayerState> {
        self.inner.game.read().await.roster().to_vec()
    }

    /// Latest roster without the local player
    pub async fn remote_players(&self) -> Vec<PlayerState> {
        self.inner.game.read().await.remote_players()
    }

    /// Leaves the arena if needed, then stops the background task and closes
    /// the connection
    pub async fn shutdown(&self) {
        if let Err(e) = self.leave().await {
            debug!("Could not announce leave on shutdown: {}", e);
        }

        self.inner.shutdown.send_replace(true);
        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
    }
}

async fn connect(addr: SocketAddrV4, connect_timeout: Duration) -> Result<TcpStream, ProtocolError> {
    let stream = timeout(connect_timeout, TcpStream::connect(addr)).await??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Runs the reconnect state machine until shutdown
async fn sync_loop(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut address = inner.address.subscribe();
    let mut backoff = Backoff::new(inner.config.backoff_initial, inner.config.backoff_max);

    loop {
        if *shutdown.borrow() {
            break;
        }

        inner.set_status(ConnectionStatus::Connecting);
        let text = address.borrow_and_update().clone();

        let addr = match parse_server_address(&text) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("{}", e);
                inner.set_status(ConnectionStatus::InvalidAddress);
                tokio::select! {
                    changed = address.changed() => if changed.is_err() { break },
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        let stream = match connect(addr, inner.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not connect to server {}: {}", addr, e);
                inner.set_status(ConnectionStatus::Disconnected);
                wait_before_retry(&mut backoff, &mut shutdown, &mut address).await;
                continue;
            }
        };

        backoff.reset();
        info!("Connected to server: {}", addr);

        let (reader, writer) = stream.into_split();
        let abort = Arc::new(Notify::new());
        *inner.link.lock().await = Some(Link {
            writer,
            abort: Arc::clone(&abort),
        });
        inner.set_status(ConnectionStatus::Connected);

        let announcement = inner.game.read().await.announcement();
        if let Some(player) = announcement {
            info!("Re-announcing player #{}", player.id);
            if let Err(e) = inner.send_state(&player).await {
                warn!("Failed to re-announce player #{}: {}", player.id, e);
            }
        }

        let end = receive_loop(&inner, reader, &abort, &mut shutdown, &mut address).await;

        *inner.link.lock().await = None;
        inner.game.write().await.clear_roster();
        inner.set_status(ConnectionStatus::Disconnected);

        match end {
            LinkEnd::Failed(e) => info!("Disconnected from server ({})", e),
            LinkEnd::SendFailed => info!("Disconnected from server (send failed)"),
            LinkEnd::AddressChanged => {
                info!("Server address changed, reconnecting");
                continue;
            }
            LinkEnd::Shutdown => break,
        }

        wait_before_retry(&mut backoff, &mut shutdown, &mut address).await;
    }

    *inner.link.lock().await = None;
    inner.set_status(ConnectionStatus::Disconnected);
    debug!("Sync loop stopped");
}

/// Sleeps for the next backoff delay, waking early on shutdown or a new
/// address
async fn wait_before_retry(
    backoff: &mut Backoff,
    shutdown: &mut watch::Receiver<bool>,
    address: &mut watch::Receiver<String>,
) {
    let delay = backoff.next_delay();
    debug!("Retrying in {:?}", delay);

    tokio::select! {
        _ = sleep(delay) => {}
        _ = shutdown.changed() => {}
        changed = address.changed() => {
            if changed.is_ok() {
                backoff.reset();
            }
        }
    }
}

/// Reads roster frames into the mirror until the link ends
async fn receive_loop(
    inner: &Inner,
    mut reader: OwnedReadHalf,
    abort: &Notify,
    shutdown: &mut watch::Receiver<bool>,
    address: &mut watch::Receiver<String>,
) -> LinkEnd {
    loop {
        let frame = tokio::select! {
            result = next_frame(&mut reader, inner.config.read_timeout) => result,
            _ = abort.notified() => return LinkEnd::SendFailed,
            _ = shutdown.changed() => return LinkEnd::Shutdown,
            changed = address.changed() => {
                return match changed {
                    Ok(()) => LinkEnd::AddressChanged,
                    Err(_) => LinkEnd::Shutdown,
                };
            }
        };

        let payload = match frame {
            Ok(payload) => payload,
            Err(e) if !e.is_fatal() => {
                warn!("Discarding frame from server: {}", e);
                continue;
            }
            Err(e) => return LinkEnd::Failed(e),
        };

        match decode_roster(&payload) {
            Ok(players) => {
                debug!("Roster update: {} players", players.len());
                inner.game.write().await.replace_roster(players);
            }
            Err(e) => warn!("Discarding roster: {}", e),
        }
    }
}

async fn next_frame(
    reader: &mut OwnedReadHalf,
    read_timeout: Option<Duration>,
) -> Result<Vec<u8>, ProtocolError> {
    match read_timeout {
        Some(limit) => timeout(limit, read_frame(reader)).await?,
        None => read_frame(reader).await,
    }
}
