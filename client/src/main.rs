use clap::Parser;
use client::input::{parse_command, Command, HELP};
use client::network::{ClientConfig, ConnectionStatus, SyncClient};
use log::{info, warn};
use shared::{local_ip, DEFAULT_PORT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to (A.B.C.D:PORT)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Give up a connection attempt after this many milliseconds
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Reconnect when the server is silent for this many milliseconds (0 disables)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,

    /// First delay between reconnect attempts
    #[arg(long, default_value = "250")]
    backoff_initial_ms: u64,

    /// Longest delay between reconnect attempts
    #[arg(long, default_value = "8000")]
    backoff_max_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        server: args
            .server
            .unwrap_or_else(|| format!("{}:{}", local_ip(), DEFAULT_PORT)),
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        read_timeout: (args.read_timeout_ms > 0).then(|| Duration::from_millis(args.read_timeout_ms)),
        backoff_initial: Duration::from_millis(args.backoff_initial_ms),
        backoff_max: Duration::from_millis(args.backoff_max_ms),
        ..ClientConfig::default()
    };

    info!("Starting client...");
    info!("Connecting to: {}", config.server);

    let client = SyncClient::spawn(config);

    let mut status = client.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            match current {
                ConnectionStatus::Connected => println!("Connected."),
                ConnectionStatus::Connecting => println!("Connecting..."),
                ConnectionStatus::Disconnected => println!("Disconnected from server."),
                ConnectionStatus::InvalidAddress => {
                    println!("Invalid server address. Use `connect A.B.C.D:PORT`.")
                }
            }
        }
    });

    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                println!("Unknown command. Type `help` for a list.");
            }
            continue;
        };

        match command {
            Command::Move(direction) => match client.move_player(direction).await {
                Ok(true) => {
                    if let Some(player) = client.local_player().await {
                        println!("You are at ({}, {})", player.x, player.y);
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Move not sent: {}", e),
            },
            Command::Join => match client.join().await {
                Ok(player) => println!("You are player #{} ({}).", player.id, player.color),
                Err(e) => println!("Joined locally, server not reached yet: {}", e),
            },
            Command::Leave => {
                if let Err(e) = client.leave().await {
                    warn!("Leave not sent: {}", e);
                }
            }
            Command::Connect(address) => match client.set_address(&address) {
                Ok(addr) => println!("Switching to {}", addr),
                Err(e) => println!("{}", e),
            },
            Command::Roster => {
                let players = client.remote_players().await;
                if players.is_empty() {
                    println!("No other players.");
                }
                for player in players {
                    println!(
                        "  #{} at ({}, {}) {}",
                        player.id, player.x, player.y, player.color
                    );
                }
            }
            Command::Status => {
                println!("{:?} ({})", client.status(), client.server_address())
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }

    client.shutdown().await;
    Ok(())
}
