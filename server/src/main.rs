use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use shared::{local_ip, DEFAULT_PORT};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address to bind (defaults to this machine's outbound IPv4 address)
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,

    /// First port to try; taken ports are skipped
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Drop clients that send nothing for this many milliseconds (0 disables)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,

    /// Drop clients whose socket stalls a write for this many milliseconds (0 disables)
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host.unwrap_or(IpAddr::V4(local_ip())),
        port: args.port,
        read_timeout: millis(args.read_timeout_ms),
        write_timeout: millis(args.write_timeout_ms),
    };

    let server = Server::bind(config).await?;
    info!("Clients can connect to {}", server.local_addr()?);

    let shutdown = server.shutdown_handle();
    let mut server_handle = tokio::spawn(server.run());

    let interrupted = tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
            true
        }
    };

    if interrupted {
        let _ = server_handle.await;
    }

    Ok(())
}
