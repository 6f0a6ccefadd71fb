//! # bufsql
//!
//! Drains a line-buffered telemetry file into a relational table.
//!
//! An external producer appends `key:value;key:value` lines to a buffer file.
//! Each cycle drains the file, decodes every line into a [`Record`], inserts
//! it through a [`Store`], and puts malformed lines back for a later retry.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bufsql::{BufferStore, IngestionCycle, MemoryStore, Monitor, Uploader};
//! use std::time::Duration;
//!
//! let buffer = BufferStore::open("buffer.txt")?;
//! let cycle = IngestionCycle::new(buffer, MemoryStore::new(), Uploader::default(), 7);
//!
//! let mut monitor = Monitor::new(cycle, Duration::from_secs(1));
//! monitor.run()?;
//! # Ok::<(), bufsql::IngestError>(())
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod cycle;
pub mod error;
pub mod monitor;
pub mod record;
pub mod retry;
pub mod store;
pub mod upload;

// Re-exports
pub use buffer::{BufferStore, HistoryLog};
pub use codec::{DecodeError, LineCodec};
pub use config::{ConfigError, ConfigLayer, Settings};
pub use cycle::{
    resolve_country_code, CycleReport, IngestionCycle, KnownFailurePolicy, LineOutcome,
    WriteFailurePolicy,
};
pub use error::{IngestError, Result};
pub use monitor::Monitor;
pub use record::Record;
pub use retry::RetryTracker;
pub use store::{MemoryStore, Statement, Store, StoreError};
pub use upload::{BindMode, ColumnPolicy, UploadError, Uploader};

#[cfg(feature = "mysql")]
pub use store::{MySqlConnectOptions, MySqlStore, MySqlSyncStore};
