use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::retry::{retry_with_backoff, RetryConfig};

pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    retry_with_backoff(
        RetryConfig::default(),
        move || {
            PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .min_connections(cfg.min_connections)
                .connect(&cfg.url)
        },
        "postgres connect",
    )
    .await
    .context("connect to database")
}

pub async fn migrate(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")
}
