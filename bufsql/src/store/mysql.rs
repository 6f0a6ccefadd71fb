//! MySQL store backend.
//!
//! One connection for the process lifetime, no pool and no reconnect.
//! Autocommit is switched off at connect so a cycle's inserts become
//! visible together on [`Store::commit`].
//!
//! Enable with `mysql` feature flag (default):
//! ```toml
//! bufsql = { version = "0.1", features = ["mysql"] }
//! ```

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tokio::runtime::{Builder, Runtime};

use super::{Result, Statement, Store, StoreError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

/// MySQL store backend (async).
pub struct MySqlStore {
    conn: MySqlConnection,
}

impl MySqlStore {
    /// Open the connection, giving up after three seconds.
    pub async fn connect(options: MySqlConnectOptions) -> Result<Self> {
        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
            .await
            .map_err(|_| {
                StoreError::Connection(format!(
                    "timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(store_error)?;

        sqlx::raw_sql("SET autocommit = 0")
            .execute(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(Self { conn })
    }

    pub async fn execute_async(&mut self, statement: &Statement) -> Result<u64> {
        let result = if statement.params().is_empty() {
            sqlx::raw_sql(statement.sql()).execute(&mut self.conn).await
        } else {
            let mut query = sqlx::query(statement.sql());
            for param in statement.params() {
                query = query.bind(param.as_str());
            }
            query.execute(&mut self.conn).await
        }
        .map_err(store_error)?;

        Ok(result.rows_affected())
    }

    pub async fn query_scalar_async(&mut self, statement: &Statement) -> Result<Option<i64>> {
        let mut query = sqlx::query_scalar::<_, i64>(statement.sql());
        for param in statement.params() {
            query = query.bind(param.as_str());
        }
        query
            .fetch_optional(&mut self.conn)
            .await
            .map_err(store_error)
    }

    pub async fn commit_async(&mut self) -> Result<()> {
        sqlx::raw_sql("COMMIT")
            .execute(&mut self.conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    pub async fn rollback_async(&mut self) -> Result<()> {
        sqlx::raw_sql("ROLLBACK")
            .execute(&mut self.conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(store_error)
    }
}

/// Sync wrapper for MySqlStore that implements Store.
///
/// Owns a current-thread tokio runtime and blocks on every call.
pub struct MySqlSyncStore {
    inner: MySqlStore,
    runtime: Runtime,
}

impl MySqlSyncStore {
    pub fn connect(options: MySqlConnectOptions) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let inner = runtime.block_on(MySqlStore::connect(options))?;
        Ok(Self { inner, runtime })
    }

    pub fn close(self) -> Result<()> {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.close())
    }
}

impl Store for MySqlSyncStore {
    fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.runtime.block_on(self.inner.execute_async(statement))
    }

    fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>> {
        self.runtime.block_on(self.inner.query_scalar_async(statement))
    }

    fn commit(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.commit_async())
    }

    fn rollback(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.rollback_async())
    }
}
