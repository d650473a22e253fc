//! wsgate: a WebSocket (RFC 6455) server
//!
//! Serves the echo handler under each configured subprotocol.
//!
//! Features:
//! - HTTP Upgrade handshake with subprotocol negotiation
//! - Incremental frame decoding with a payload size limit
//! - Several listeners sharing one connection limit
//! - Graceful shutdown on SIGINT or SIGTERM
//! - Configuration via CLI arguments or TOML file

use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wsgate::config::Config;
use wsgate::protocols::echo;
use wsgate::Server;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = ?config.listen,
        subprotocols = ?config.subprotocols,
        max_connections = config.max_connections,
        max_payload_size = config.max_payload_size,
        "Starting wsgate server"
    );

    let mut server = Server::new(config.server_settings());
    for name in &config.subprotocols {
        server.register_handler(name.as_str(), echo::handle_session);
    }
    for addr in &config.listen {
        server.listen_with(*addr, config.listen_options)?;
    }

    shutdown_signal().await?;
    server.stop().await;
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
            }
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
