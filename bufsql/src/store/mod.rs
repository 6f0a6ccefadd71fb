//! Relational store boundary.
//!
//! The ingestion core only needs three operations from the database:
//! execute a write, read a single integer scalar, and commit. Backends:
//! - In-memory (tests and `--dry-run`)
//! - MySQL (enable with `mysql` feature, on by default)
//!
//! ## MySQL Usage
//!
//! ```rust,ignore
//! use bufsql::store::{MySqlConnectOptions, MySqlSyncStore, Statement, Store};
//!
//! let options = MySqlConnectOptions::new()
//!     .host("127.0.0.1")
//!     .username("line-3")
//!     .password("secret")
//!     .database("EUPRONET");
//! let mut store = MySqlSyncStore::connect(options)?;
//! store.execute(&Statement::new("INSERT INTO `queries` (`state`) VALUES (?)").bind("on"))?;
//! store.commit()?;
//! ```

mod memory;

#[cfg(feature = "mysql")]
mod mysql;

pub use memory::MemoryStore;

#[cfg(feature = "mysql")]
pub use mysql::{MySqlStore, MySqlSyncStore};
#[cfg(feature = "mysql")]
pub use sqlx::mysql::MySqlConnectOptions;

use std::fmt;

use thiserror::Error;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The statement was rejected; the connection is still usable.
    #[error("backend error: {0}")]
    Backend(String),

    /// The connection is gone. Nothing more can be written.
    #[error("connection lost: {0}")]
    Connection(String),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// SQL text plus positional (`?`) string parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: Vec<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.params.is_empty() {
            write!(f, " {:?}", self.params)?;
        }
        Ok(())
    }
}

/// Store backend trait.
///
/// Writes are not visible to other clients until [`Store::commit`].
pub trait Store: Send {
    /// Execute a write statement. Returns rows affected.
    fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Run a read query and return the first column of the first row.
    fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>>;

    /// Commit everything executed since the last commit.
    fn commit(&mut self) -> Result<()>;

    /// Discard everything executed since the last commit.
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn execute(&mut self, statement: &Statement) -> Result<u64> {
        (**self).execute(statement)
    }

    fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>> {
        (**self).query_scalar(statement)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }
}
