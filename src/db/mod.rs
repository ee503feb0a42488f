pub mod entities;
pub mod enums;
pub mod memory;
pub mod models;
pub mod repository;
pub mod services;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::info;

/// Applies the schema. Every statement is idempotent, so this runs on each start.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    info!("Running database migrations...");
    let migrations = include_str!("../../migrations/20261019000000_create_monitoring_tables.sql");
    db.execute_unprepared(migrations).await?;
    info!("Database migrations completed successfully.");
    Ok(())
}
