mod models;
pub mod repository;

pub use repository::SqliteKnowledgeRepository;

use crate::error::{Result, StorageError};
use crate::version::{get_schema_version, is_compatible};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

const EXPECTED_KNOWLEDGE_VERSION: &str = "1.0.0";

/// Initializes the knowledge database, running migrations and creating the
/// file if missing (§3, §4.2: "the durable state... one transaction per
/// user-facing operation").
pub async fn init_knowledge_db(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    sqlx::migrate!("./migrations_knowledge").run(&pool).await?;

    let db_version = get_schema_version(&pool).await?;
    if !is_compatible(&db_version, EXPECTED_KNOWLEDGE_VERSION) {
        return Err(StorageError::IncompatibleSchema {
            db_version,
            app_version: EXPECTED_KNOWLEDGE_VERSION.to_string(),
            message: "Knowledge database schema is incompatible with this app version".to_string(),
        });
    }

    tracing::info!(
        "Knowledge DB initialized: schema v{}, expected v{}",
        db_version,
        EXPECTED_KNOWLEDGE_VERSION
    );

    Ok(pool)
}
