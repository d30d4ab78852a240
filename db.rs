use crate::error::Result;
use crate::schema;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Initializes the database connection pool and runs migrations.
pub fn init_database(db_path: &Path) -> Result<DbPool> {
    log::info!("Database path: {}", db_path.display());

    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        // WAL keeps writers from blocking the status queries; a committed
        // transition is durable before the caller sees success.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
    });
    let pool = r2d2::Pool::new(manager)?;

    run_migrations(&pool.get()?)?;

    Ok(pool)
}

/// Applies all pending database migrations.
fn run_migrations(connection: &DbConnection) -> Result<()> {
    // `DbConnection` dereferences to the underlying rusqlite `Connection`,
    // allowing us to call the rusqlite APIs directly.
    let connection: &Connection = &*connection;

    log::info!("Running database migrations...");

    connection.execute_batch(schema::MIGRATION_0001)?;
    connection.execute_batch(schema::MIGRATION_0002)?;
    connection.execute_batch(schema::MIGRATION_0003)?;

    log::info!("Migrations applied successfully.");
    Ok(())
}

#[cfg(test)]
pub fn test_pool() -> DbPool {
    let path = std::env::temp_dir().join(format!("photo_sidecar_test_{}.db", uuid::Uuid::new_v4()));
    init_database(&path).expect("test database")
}
