//! Embedded on-device storage.

mod local_store;

pub use local_store::{LocalStore, LocalStoreError};

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Provisions one partition per store name. Each migration is one schema
/// version; later versions only add partitions.
pub static LOCAL_MIGRATOR: Migrator = sqlx::migrate!("./migrations/local");

/// Opens (creating if missing) a SQLite database at `path`.
pub async fn connect(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Initialize the local database connection pool and run migrations.
pub async fn init_db(path: &Path) -> Result<SqlitePool, LocalStoreError> {
    let pool = connect(path).await?;
    LOCAL_MIGRATOR.run(&pool).await?;
    Ok(pool)
}
