use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use super::env::{env_flag, redact_postgres_url};

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(label: &str, database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = env_flag("USE_PREPARED", false);
        let mut connect_options = PgConnectOptions::from_str(database_url)
            .with_context(|| format!("parse {label} database URL"))?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .with_context(|| format!("connect {label} database"))?;

        // Ping so a bad DSN fails here rather than inside the first job.
        sqlx::query("SELECT 1")
            .persistent(false)
            .execute(&pool)
            .await
            .with_context(|| format!("ping {label} database"))?;

        info!(
            store = label,
            url = %redact_postgres_url(database_url),
            max_connections,
            "connected to db"
        );
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
