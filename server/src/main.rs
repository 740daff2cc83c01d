use clap::Parser;
use log::{error, info};
use server::accounts::AccountStore;
use server::config::ServerConfig;
use server::lobby::Lobby;
use server::network::{Server, ServerEvent};
use std::path::PathBuf;

/// Main-method of the application.
/// Parses command-line arguments, loads the accounts and runs the server
/// until it is stopped with Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "4444")]
        port: u16,
        /// Maximum simultaneous connections
        #[clap(short, long, default_value = "20")]
        max_clients: usize,
        /// Account file
        #[clap(short, long, default_value = "users/accounts.txt")]
        accounts: PathBuf,
        /// Directory receiving one log file per game
        #[clap(short, long, default_value = "saved_games")]
        games_dir: PathBuf,
        /// Do not write game logs
        #[clap(long)]
        no_game_logs: bool,
    }

    env_logger::init();
    println!("Set RUST_LOG=info (or debug) to see server activity");

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_clients: args.max_clients,
        accounts_path: Some(args.accounts),
        games_dir: (!args.no_game_logs).then_some(args.games_dir),
        ..ServerConfig::default()
    };

    let accounts = match &config.accounts_path {
        Some(path) => AccountStore::load(path)?,
        None => AccountStore::in_memory(),
    };
    info!("Loaded {} accounts", accounts.len());

    let lobby = Lobby::new(&config, accounts);
    let mut server = Server::bind(&config, lobby).await?;

    // Handle shutdown gracefully
    let events = server.events();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        println!("Received Ctrl+C, shutting down gracefully...");
        if events.send(ServerEvent::Shutdown).is_err() {
            error!("Server loop already stopped");
        }
    });

    server.run().await?;
    Ok(())
}
