use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod commands;

use brainsync::config::Config;
use brainsync::db::LocalStore;
use brainsync::logging::init_tracing;
use brainsync::remote::{Disconnected, RemoteStore, RestRemote};
use brainsync::Persistence;
use commands::{
    sign_in, ConfigCommand, DeleteCommand, ListCommand, PullCommand, SaveCommand, StatusCommand,
};

#[derive(Parser)]
#[command(name = "brainsync")]
#[command(version)]
#[command(about = "Local-first storage for tasks, notes and journal with background sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Never contact the sync server
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List records in a store
    List(ListCommand),

    /// Create or replace a record
    Save(SaveCommand),

    /// Delete a record
    Delete(DeleteCommand),

    /// Pull every store from the sync server
    Pull(PullCommand),

    /// Show sync and local store status
    Status(StatusCommand),

    /// Show configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    init_tracing("brainsync=warn");

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let remote = if cli.offline || !config.sync.is_configured() {
        None
    } else {
        Some(RestRemote::from_config(&config.sync)?)
    };

    match cli.command {
        Some(Commands::List(cmd)) => {
            let persistence = open_persistence(&config, remote.as_ref());
            cmd.run(&persistence).await?;
        }
        Some(Commands::Save(cmd)) => {
            let persistence = open_persistence(&config, remote.as_ref());
            sign_in(&persistence, remote.as_ref()).await;
            cmd.run(&persistence).await?;
            persistence.flush().await;
        }
        Some(Commands::Delete(cmd)) => {
            let persistence = open_persistence(&config, remote.as_ref());
            sign_in(&persistence, remote.as_ref()).await;
            cmd.run(&persistence).await?;
            persistence.flush().await;
        }
        Some(Commands::Pull(cmd)) => {
            let persistence = open_persistence(&config, remote.as_ref());
            cmd.run(&persistence, remote.as_ref()).await?;
        }
        Some(Commands::Status(cmd)) => {
            let persistence = open_persistence(&config, remote.as_ref());
            cmd.run(&persistence, &config, remote.as_ref()).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

fn open_persistence(config: &Config, remote: Option<&RestRemote>) -> Persistence {
    let local = Arc::new(LocalStore::new(config.database_path.value.clone()));
    let remote: Arc<dyn RemoteStore> = match remote {
        Some(remote) => Arc::new(remote.clone()),
        None => Arc::new(Disconnected),
    };
    Persistence::new(local, remote, config.sync.retry_policy())
}
