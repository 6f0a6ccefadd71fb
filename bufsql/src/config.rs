//! Settings resolution.
//!
//! Settings come from three layers, later ones winning:
//! built-in defaults, a `key = value` config file, then command-line flags.
//! Empty values count as unset at every layer.
//!
//! ```text
//! address = 10.0.0.5
//! username = line-3
//! password = hunter2
//! filepath = buffer.txt
//! logfile = history.log
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::cycle::{KnownFailurePolicy, WriteFailurePolicy};
use crate::monitor::DEFAULT_INTERVAL;
use crate::retry::{RetryTracker, DEFAULT_CAPACITY};
use crate::upload::{BindMode, ColumnPolicy, Uploader, DEFAULT_TABLE};

pub const DEFAULT_CONFIG_FILE: &str = "config.cfg";
pub const DEFAULT_ADDRESS: &str = "176.241.29.199";
pub const DEFAULT_DBNAME: &str = "EUPRONET";
pub const DEFAULT_PORT: u16 = 3306;

/// Every key a layer accepts.
pub const KEYS: &[&str] = &[
    "address",
    "port",
    "username",
    "password",
    "dbname",
    "table",
    "filepath",
    "logfile",
    "interval",
    "bind_mode",
    "known_failures",
    "write_failures",
    "failure_capacity",
    "allowed_columns",
];

const CONNECTION_KEYS: &[&str] = &["address", "username", "password"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value '{value}' for '{key}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown setting '{0}'")]
    UnknownKey(String),
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// One source of raw setting values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    values: BTreeMap<&'static str, String>,
}

impl ConfigLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        let mut layer = Self::new();
        layer.values.insert("address", DEFAULT_ADDRESS.to_string());
        layer.values.insert("dbname", DEFAULT_DBNAME.to_string());
        layer
    }

    /// Parse config file text. Unknown keys and lines that are not
    /// assignments are skipped and reported as warnings.
    pub fn parse(text: &str) -> (Self, Vec<String>) {
        let mut layer = Self::new();
        let mut warnings = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warnings.push(format!("setting '{line}' is not an assignment, ignoring it"));
                continue;
            };
            if layer.set(key.trim(), value.trim()).is_err() {
                warnings.push(format!("unexpected setting '{}', ignoring it", key.trim()));
            }
        }

        (layer, warnings)
    }

    pub fn load(path: &Path) -> Result<(Self, Vec<String>), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Set a value. Blank values are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        let key = KEYS
            .iter()
            .copied()
            .find(|k| *k == key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(key, value.trim().to_string());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Overlay `other` on top of this layer.
    pub fn merge(&mut self, other: ConfigLayer) {
        self.values.extend(other.values);
    }

    /// Turn the merged layer into typed settings.
    ///
    /// Relative paths resolve against `base_dir`. Connection settings are
    /// only required when `require_connection` is set.
    pub fn resolve(&self, base_dir: &Path, require_connection: bool) -> Result<Settings, ConfigError> {
        let mut required = vec!["filepath"];
        if require_connection {
            required.extend_from_slice(CONNECTION_KEYS);
        }
        let missing: Vec<String> = required
            .into_iter()
            .filter(|k| self.get(k).is_none())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let text = |key: &str| self.get(key).unwrap_or_default().to_string();
        let path = |value: &str| {
            let p = Path::new(value);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };

        Ok(Settings {
            address: text("address"),
            port: self.parse_or("port", DEFAULT_PORT)?,
            username: text("username"),
            password: text("password"),
            dbname: self.get("dbname").unwrap_or(DEFAULT_DBNAME).to_string(),
            table: self.get("table").unwrap_or(DEFAULT_TABLE).to_string(),
            filepath: path(&text("filepath")),
            logfile: self.get("logfile").map(path),
            interval: self.interval()?,
            bind_mode: self.parse_or("bind_mode", BindMode::default())?,
            known_failures: self.parse_or("known_failures", KnownFailurePolicy::default())?,
            write_failures: self.parse_or("write_failures", WriteFailurePolicy::default())?,
            failure_capacity: self.parse_or("failure_capacity", DEFAULT_CAPACITY)?,
            allowed_columns: self
                .get("allowed_columns")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(value) => value.parse().map_err(|e| ConfigError::invalid(key, value, e)),
            None => Ok(default),
        }
    }

    fn interval(&self) -> Result<Duration, ConfigError> {
        let Some(value) = self.get("interval") else {
            return Ok(DEFAULT_INTERVAL);
        };
        let secs: f64 = value
            .parse()
            .map_err(|e| ConfigError::invalid("interval", value, e))?;
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) if !interval.is_zero() => Ok(interval),
            _ => Err(ConfigError::invalid("interval", value, "must be a positive number of seconds")),
        }
    }
}

/// Resolved, read-only settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub dbname: String,
    pub table: String,
    pub filepath: PathBuf,
    pub logfile: Option<PathBuf>,
    pub interval: Duration,
    pub bind_mode: BindMode,
    pub known_failures: KnownFailurePolicy,
    pub write_failures: WriteFailurePolicy,
    pub failure_capacity: usize,
    pub allowed_columns: Vec<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("table", &self.table)
            .field("filepath", &self.filepath)
            .field("logfile", &self.logfile)
            .field("interval", &self.interval)
            .field("bind_mode", &self.bind_mode)
            .field("known_failures", &self.known_failures)
            .field("write_failures", &self.write_failures)
            .field("failure_capacity", &self.failure_capacity)
            .field("allowed_columns", &self.allowed_columns)
            .finish()
    }
}

impl Settings {
    pub fn uploader(&self) -> Uploader {
        let columns = if self.allowed_columns.is_empty() {
            ColumnPolicy::PassThrough
        } else {
            ColumnPolicy::allow_list(self.allowed_columns.iter().cloned())
        };
        Uploader::new(&self.table)
            .with_bind_mode(self.bind_mode)
            .with_column_policy(columns)
    }

    /// A `failure_capacity` of 0 means never evict.
    pub fn tracker(&self) -> RetryTracker {
        match self.failure_capacity {
            0 => RetryTracker::unbounded(),
            capacity => RetryTracker::with_capacity(capacity),
        }
    }

    #[cfg(feature = "mysql")]
    pub fn connect_options(&self) -> sqlx::mysql::MySqlConnectOptions {
        sqlx::mysql::MySqlConnectOptions::new()
            .host(&self.address)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.dbname)
    }
}
