use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use tracing::info;

use crate::config::DatabaseConfig;

/// Open the pool with explicit acquire and statement timeouts.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.url)
        .context("parse DATABASE_URL")?
        .options([("statement_timeout", config.statement_timeout_ms)]);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
        .context("connect to database")?;

    info!(max_connections = config.max_connections, "database pool ready");
    Ok(pool)
}

/// Apply pending migrations. The unique constraints on `users` live there,
/// so startup fails if they cannot be applied.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run database migrations")?;
    info!("database migrations applied");
    Ok(())
}
