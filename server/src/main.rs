use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::GameServer;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Maximum number of concurrent connections
        #[clap(short, long, default_value = "64")]
        max_clients: usize,
        /// Seconds a dropped player may take to log back in before being purged
        #[clap(long, default_value = "60")]
        reconnect_window: u64,
        /// Seconds per turn before the player on turn forfeits (0 disables)
        #[clap(long, default_value = "0")]
        turn_timeout: u64,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let turn_timeout = (args.turn_timeout > 0).then(|| Duration::from_secs(args.turn_timeout));
    let mut config = ServerConfig::default()
        .with_bind_addr(format!("{}:{}", args.host, args.port))
        .with_reconnect_window(Duration::from_secs(args.reconnect_window))
        .with_turn_timeout(turn_timeout);
    config.max_clients = args.max_clients;

    info!(
        "Starting game server on {} (max {} clients)",
        config.bind_addr, config.max_clients
    );
    let server = GameServer::with_config(config);

    let server_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start().await })
    };

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            server.stop();
        }
    }

    Ok(())
}
