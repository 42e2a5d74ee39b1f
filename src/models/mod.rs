use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

pub mod call;
pub mod enums;
pub mod insight;
pub mod migration;
pub mod transcript;

pub use enums::{CallStatus, PaymentCurrency, PaymentMethod, PaymentStatus};

pub fn prepare_sqlite_database(database_url: &str) -> Result<()> {
    let Some(path_part) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let (path_str, _) = path_part.split_once('?').unwrap_or((path_part, ""));
    if path_str.is_empty() || path_str.starts_with(':') {
        return Ok(());
    }

    let path = std::path::Path::new(path_str);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create directory for database at {}",
                    parent.display()
                )
            })?;
        }
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to create database file at {}", path.display()))?;
    }

    Ok(())
}

pub async fn connect_db(database_url: &str) -> Result<DatabaseConnection> {
    prepare_sqlite_database(database_url)?;
    let mut options = ConnectOptions::new(database_url.to_string());
    if database_url.contains(":memory:") {
        // every pooled connection would otherwise open its own empty database
        options.max_connections(1).min_connections(1);
    }
    Database::connect(options)
        .await
        .with_context(|| format!("failed to connect database: {}", database_url))
}

pub async fn create_db(database_url: &str) -> Result<DatabaseConnection> {
    let db = connect_db(database_url).await?;
    migration::Migrator::up(&db, None)
        .await
        .context("failed to run database migrations")?;
    Ok(db)
}

/// Drops every table and re-applies all migrations.
pub async fn reset_db(db: &DatabaseConnection) -> Result<()> {
    migration::Migrator::fresh(db)
        .await
        .context("failed to reset database")?;
    info!("database schema re-created");
    Ok(())
}
