//! Echo server for all supported protocol generations.
//!
//! Demonstrates:
//! - Building a Listener with custom options
//! - Handling Connected, DataReceived and Disconnected events
//! - Broadcasting to every open connection
//!
//! Usage:
//!   cargo run --example echo_server
//!   cargo run --example echo_server -- --debug
//!   cargo run --example echo_server -- --addr 0.0.0.0:9001
//!   cargo run --example echo_server -- --config listener.json

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use websocket_engine::{Listener, ListenerEvent, ListenerOptions, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ADDR: &str = "127.0.0.1:9001";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    addr: String,
    config: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            addr: value_of("--addr").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            config: value_of("--config"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Echo Server ===\n");

    let options = match &args.config {
        Some(path) => ListenerOptions::from_file(path)?,
        None => ListenerOptions::new().with_max_connections(256),
    };

    let listener = Listener::builder()
        .bind(args.addr)
        .options(options)
        .on_event(|event| {
            match event {
                ListenerEvent::Connected(connection) => {
                    println!(
                        "[+] {} {} ({})",
                        connection.id(),
                        connection.remote_addr(),
                        connection.version().map(|v| v.to_string()).unwrap_or_default()
                    );
                }
                ListenerEvent::DataReceived {
                    connection,
                    message,
                } => {
                    if message.is_text() {
                        connection.send_text(&message.text(connection.encoding()))?;
                    } else {
                        connection.send_binary(message.payload())?;
                    }
                }
                ListenerEvent::Disconnected { connection, reason } => {
                    println!("[-] {} code={:?}", connection.id(), reason.code);
                }
                ListenerEvent::Ping { .. } | ListenerEvent::Pong { .. } => {}
            }
            Ok(())
        })
        .build()?;

    listener.start().await?;
    println!(
        "Listening on {}\nPress Ctrl+C to stop\n",
        listener.ws_url().unwrap_or_default()
    );

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let sent = listener.broadcast_text("heartbeat");
                println!("[*] Heartbeat sent to {sent} connection(s)");
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    listener.close();
    println!("\nDone.");
    Ok(())
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "websocket_engine=debug"
    } else {
        "websocket_engine=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
