/// Database abstraction layer
///
/// The scheduler only sees the [`Registry`] and [`StatusStore`] traits;
/// [`DatabaseImpl`] backs both with a pooled LibSQL (SQLite) database.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{DatabaseImpl, Registry, StatusStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
