//! Server network layer: listener setup, port scanning and the accept loop

use crate::handler::ConnectionHandler;
use crate::registry::Registry;
use log::{debug, error, info};
use shared::{local_ip, DEFAULT_PORT};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Errors that stop the server from starting or running
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("no free port on {0}: every port from 0 to 65535 is taken")]
    PortsExhausted(IpAddr),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Runtime settings for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to bind
    pub host: IpAddr,
    /// First port tried by the port scan
    pub port: u16,
    /// Drop a connection that sends nothing for this long
    pub read_timeout: Option<Duration>,
    /// Drop a connection whose socket accepts no frame for this long
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(local_ip()),
            port: DEFAULT_PORT,
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Port tried after `port` fails; wraps from 65535 to 0
pub fn next_port(port: u16) -> u16 {
    port.wrapping_add(1)
}

/// Binds `host`, starting at `start` and walking upward through the whole
/// port space until a bind succeeds
///
/// Only "in use" and "permission denied" move the scan on; any other error
/// means the host itself cannot be bound and is returned immediately.
pub async fn bind_with_scan(host: IpAddr, start: u16) -> Result<TcpListener, ServerError> {
    let mut port = start;

    for _ in 0..=u16::MAX as u32 {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                info!("Server socket bound to {}", listener.local_addr()?);
                return Ok(listener);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
                ) =>
            {
                debug!("Port {} unavailable: {}", port, e);
                port = next_port(port);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ServerError::PortsExhausted(host))
}

/// Raises the shared shutdown flag
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Arena server: accepts connections and runs one handler task per peer
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: ServerConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = bind_with_scan(config.host, config.port).await?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Server {
            listener,
            registry: Arc::new(Registry::new()),
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accepts connections until the shutdown flag is raised
    ///
    /// Handlers watch the same flag and close their sockets on the way out.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown_tx.subscribe();
        info!("Server started successfully");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                            }

                            let handler = ConnectionHandler::new(
                                Arc::clone(&self.registry),
                                self.config.clone(),
                            );
                            tokio::spawn(handler.run(stream, addr, self.shutdown_tx.subscribe()));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                _ = shutdown.changed() => {}
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}
