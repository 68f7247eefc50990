//! PostgreSQL-backed durable index store.
//!
//! Indices live in a single table with a unique integer column:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS indices (number INTEGER PRIMARY KEY)
//! ```
//!
//! Inserts use `ON CONFLICT DO NOTHING`, so concurrent submissions of the
//! same index commute and a single statement is atomic under cancellation.

use std::time::Duration;

use async_trait::async_trait;
use fib_core::Index;
use fib_core::config::{StoreConfig, TlsMode};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::debug;

use crate::backend::IndexStore;
use crate::error::{StateResult, from_connect, from_query};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS indices (number INTEGER PRIMARY KEY)";
const INSERT_INDEX: &str = "INSERT INTO indices (number) VALUES ($1) ON CONFLICT DO NOTHING";
const LIST_INDICES: &str = "SELECT number FROM indices ORDER BY number";

/// Upper bound on waiting for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build sqlx connect options from the store config.
pub fn connect_options(config: &StoreConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        .ssl_mode(ssl_mode(config.tls))
}

fn ssl_mode(tls: TlsMode) -> PgSslMode {
    match tls {
        TlsMode::Disable => PgSslMode::Disable,
        TlsMode::Prefer => PgSslMode::Prefer,
        TlsMode::Require => PgSslMode::Require,
    }
}

/// Pooled PostgreSQL index store. Cheap to clone.
#[derive(Clone)]
pub struct PgIndexStore {
    pool: PgPool,
}

impl PgIndexStore {
    /// Open a pool and ensure the `indices` table exists.
    ///
    /// Connecting eagerly surfaces unreachable hosts and rejected
    /// credentials here rather than on the first request.
    pub async fn connect(config: &StoreConfig) -> StateResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(connect_options(config))
            .await
            .map_err(from_connect)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        debug!(host = %config.host, database = %config.database, "index store connected");
        Ok(store)
    }

    async fn ensure_schema(&self) -> StateResult<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(from_query)?;
        Ok(())
    }
}

#[async_trait]
impl IndexStore for PgIndexStore {
    async fn insert_if_absent(&self, index: Index) -> StateResult<()> {
        let result = sqlx::query(INSERT_INDEX)
            .bind(index.value() as i32)
            .execute(&self.pool)
            .await
            .map_err(from_query)?;
        debug!(%index, inserted = result.rows_affected() == 1, "index recorded");
        Ok(())
    }

    async fn list(&self) -> StateResult<Vec<i64>> {
        let rows: Vec<i32> = sqlx::query_scalar(LIST_INDICES)
            .fetch_all(&self.pool)
            .await
            .map_err(from_query)?;
        Ok(rows.into_iter().map(i64::from).collect())
    }

    async fn ping(&self) -> StateResult<()> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(from_query)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("index store pool closed");
    }
}
