//! brainsync table server
//!
//! Hosts one table per store for many users, each row owned by one user.
//!
//! # Configuration
//!
//! Environment variables:
//! - `BRAINSYNC_SERVER_PORT`: Port to listen on (default: 8787)
//! - `BRAINSYNC_SERVER_DATA_DIR`: Directory for the database (default: ~/.local/share/brainsync-server)
//! - `BRAINSYNC_SERVER_CONFIG`: Path to config file (default: ~/.config/brainsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /me`: Returns current user info
//! - `GET /rest/{store}`: Rows owned by the caller
//! - `POST /rest/{store}`: Upsert one row
//! - `DELETE /rest/{store}/{id}`: Delete one row

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use brainsync::logging::init_tracing;
use brainsync::server::{router, ApiKeyStore, AppState, RemoteTables};

/// Server configuration
#[derive(Debug, Clone)]
struct ServerConfig {
    port: u16,
    data_dir: PathBuf,
    config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("BRAINSYNC_SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8787);

        let data_dir = std::env::var("BRAINSYNC_SERVER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("brainsync-server")
            });

        let config_path = std::env::var("BRAINSYNC_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("brainsync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing("brainsync=info,brainsync_server=info,tower_http=info");

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();

    std::fs::create_dir_all(&config.data_dir)?;
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let tables = RemoteTables::open(&config.data_dir.join("tables.db")).await?;
    let api_keys = Arc::new(ApiKeyStore::load(&config.config_path));

    let app = router(AppState { api_keys, tables });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
