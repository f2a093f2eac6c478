use autoheal::adapters::sqlite::create_migrated_test_pool;
use sqlx::SqlitePool;

/// Create an in-memory SQLite database for testing
///
/// Each call creates a completely isolated, migrated database.
pub async fn setup_test_db() -> SqlitePool {
    create_migrated_test_pool()
        .await
        .expect("failed to create test database")
}

/// Close the connection pool.
pub async fn teardown_test_db(pool: SqlitePool) {
    pool.close().await;
}
