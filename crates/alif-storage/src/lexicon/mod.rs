mod models;
pub mod repository;

pub use repository::SqliteLexiconRepository;

use crate::error::{Result, StorageError};
use crate::version::{get_schema_version, is_compatible};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

const EXPECTED_LEXICON_VERSION: &str = "1.0.0";

/// Opens the lexicon database in read-only mode (no migrations). Used by
/// tools that only need to read the Root/Lemma graph.
pub async fn open_lexicon_db_readonly(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(false)
        .read_only(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    let db_version = get_schema_version(&pool)
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("Lexicon DB opened (read-only): schema v{}", db_version);

    Ok(pool)
}

/// Initializes the lexicon database, running migrations and creating the
/// file if missing (§3, §6: "a relational store with the entities of §3").
pub async fn init_lexicon_db(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    sqlx::migrate!("./migrations_lexicon").run(&pool).await?;

    let db_version = get_schema_version(&pool).await?;
    if !is_compatible(&db_version, EXPECTED_LEXICON_VERSION) {
        return Err(StorageError::IncompatibleSchema {
            db_version,
            app_version: EXPECTED_LEXICON_VERSION.to_string(),
            message: "Lexicon database schema is incompatible with this app version".to_string(),
        });
    }

    tracing::info!(
        "Lexicon DB initialized: schema v{}, expected v{}",
        db_version,
        EXPECTED_LEXICON_VERSION
    );

    Ok(pool)
}
