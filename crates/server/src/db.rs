use sqlx::PgPool;
use tracing::{info, warn};

/// Create a PostgreSQL connection pool and run migrations.
/// Returns None if PostgreSQL is not configured; the server then runs on
/// in-memory stores.
pub async fn init_pg_pool(config: &bioflow_core::config::PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        warn!("PostgreSQL not configured — using in-memory result stores");
        return None;
    }

    match PgPool::connect(&config.connection_string()).await {
        Ok(pool) => {
            info!("PostgreSQL connected: {}", config.host);
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("Database migrations applied successfully");
                    Some(pool)
                }
                Err(e) => {
                    warn!("Failed to run migrations: {} — using in-memory result stores", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("Failed to connect to PostgreSQL: {} — using in-memory result stores", e);
            None
        }
    }
}
