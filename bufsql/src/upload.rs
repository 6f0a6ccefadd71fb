//! Record to insert statement.
//!
//! Columns come straight from record keys and are back-quoted. Values are
//! bound as `?` parameters unless [`BindMode::Literal`] is selected, which
//! inlines them as quoted string literals the way older deployments did.
//! Literal mode is only as safe as the producer writing the buffer file.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::record::Record;
use crate::store::{Statement, Store, StoreError};

pub const DEFAULT_TABLE: &str = "queries";
pub const DATE_FIELD: &str = "date";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("column '{column}' is not in the allow-list")]
    ColumnRejected { column: String },

    #[error("{source} (statement: {statement})")]
    Store {
        statement: String,
        #[source]
        source: StoreError,
    },
}

impl UploadError {
    /// True when the connection is gone and no further writes can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_fatal())
    }
}

/// How values reach the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindMode {
    #[default]
    Parameterized,
    /// Inline quoted literals. Compatibility only.
    Literal,
}

impl FromStr for BindMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parameterized" => Ok(Self::Parameterized),
            "literal" => Ok(Self::Literal),
            other => Err(format!("unknown bind mode '{other}' (expected parameterized or literal)")),
        }
    }
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameterized => f.write_str("parameterized"),
            Self::Literal => f.write_str("literal"),
        }
    }
}

/// Which record keys may become columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnPolicy {
    #[default]
    PassThrough,
    AllowList(BTreeSet<String>),
}

impl ColumnPolicy {
    pub fn allow_list<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(columns.into_iter().map(Into::into).collect())
    }

    fn check(&self, record: &Record) -> Result<(), UploadError> {
        let Self::AllowList(allowed) = self else {
            return Ok(());
        };
        match record.keys().find(|k| !allowed.contains(*k)) {
            Some(column) => Err(UploadError::ColumnRejected {
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Builds and executes one insert per record.
#[derive(Debug, Clone)]
pub struct Uploader {
    table: String,
    add_date: bool,
    bind_mode: BindMode,
    columns: ColumnPolicy,
}

impl Default for Uploader {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl Uploader {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            add_date: true,
            bind_mode: BindMode::default(),
            columns: ColumnPolicy::default(),
        }
    }

    pub fn with_add_date(mut self, add_date: bool) -> Self {
        self.add_date = add_date;
        self
    }

    pub fn with_bind_mode(mut self, bind_mode: BindMode) -> Self {
        self.bind_mode = bind_mode;
        self
    }

    pub fn with_column_policy(mut self, columns: ColumnPolicy) -> Self {
        self.columns = columns;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Build the insert, stamping `date` with the local time if absent.
    pub fn build_insert(&self, record: &mut Record) -> Result<Statement, UploadError> {
        self.build_insert_at(record, Local::now().naive_local())
    }

    pub fn build_insert_at(
        &self,
        record: &mut Record,
        now: NaiveDateTime,
    ) -> Result<Statement, UploadError> {
        if self.add_date && !record.contains_key(DATE_FIELD) {
            record.insert(DATE_FIELD, now.format(TIMESTAMP_FORMAT).to_string());
        }
        self.columns.check(record)?;

        let columns = record.keys().map(quote_identifier).collect::<Vec<_>>().join(", ");
        let table = quote_identifier(&self.table);

        Ok(match self.bind_mode {
            BindMode::Parameterized => {
                let placeholders = vec!["?"; record.len()].join(", ");
                let sql = format!("INSERT INTO {table} ({columns}) VALUES ({placeholders});");
                record
                    .values()
                    .fold(Statement::new(sql), |statement, value| statement.bind(value))
            }
            BindMode::Literal => {
                let values = record.values().map(quote_literal).collect::<Vec<_>>().join(", ");
                Statement::new(format!("INSERT INTO {table} ({columns}) VALUES ({values});"))
            }
        })
    }

    pub fn execute<S: Store + ?Sized>(
        &self,
        store: &mut S,
        statement: &Statement,
    ) -> Result<(), UploadError> {
        store
            .execute(statement)
            .map(|_| ())
            .map_err(|source| UploadError::Store {
                statement: statement.to_string(),
                source,
            })
    }

    /// `build_insert` then `execute`. Returns the executed statement.
    pub fn upload<S: Store + ?Sized>(
        &self,
        store: &mut S,
        record: &mut Record,
    ) -> Result<Statement, UploadError> {
        let statement = self.build_insert(record)?;
        self.execute(store, &statement)?;
        Ok(statement)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LineCodec;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(12, 0, 7)
            .unwrap()
    }

    #[test]
    fn test_injects_date_once() {
        let uploader = Uploader::default();
        let mut record = LineCodec::decode("state:on").unwrap();

        let statement = uploader.build_insert_at(&mut record, noon()).unwrap();
        assert_eq!(
            statement.sql(),
            "INSERT INTO `queries` (`state`, `date`) VALUES (?, ?);"
        );
        assert_eq!(statement.params(), ["on", "2024-03-05 12:00:07"]);

        // A second build must not add another date.
        uploader.build_insert_at(&mut record, noon()).unwrap();
        assert_eq!(record.keys().filter(|k| *k == DATE_FIELD).count(), 1);
    }

    #[test]
    fn test_keeps_existing_date() {
        let uploader = Uploader::default();
        let mut record = LineCodec::decode("date:2020-01-01 00:00:00;state:on").unwrap();

        let statement = uploader.build_insert_at(&mut record, noon()).unwrap();
        assert_eq!(statement.params(), ["2020-01-01 00:00:00", "on"]);
    }

    #[test]
    fn test_without_date() {
        let uploader = Uploader::new("events").with_add_date(false);
        let mut record = LineCodec::decode("state:on").unwrap();

        let statement = uploader.build_insert_at(&mut record, noon()).unwrap();
        assert_eq!(statement.sql(), "INSERT INTO `events` (`state`) VALUES (?);");
    }

    #[test]
    fn test_literal_mode_quotes_values() {
        let uploader = Uploader::default().with_bind_mode(BindMode::Literal);
        let mut record = LineCodec::decode("note:it's a\\b;date:2020-01-01 00:00:00").unwrap();

        let statement = uploader.build_insert_at(&mut record, noon()).unwrap();
        assert_eq!(
            statement.sql(),
            "INSERT INTO `queries` (`note`, `date`) VALUES ('it''s a\\\\b', '2020-01-01 00:00:00');"
        );
        assert!(statement.params().is_empty());
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let uploader = Uploader::default().with_add_date(false);
        let mut record = LineCodec::decode("a`b:1").unwrap();

        let statement = uploader.build_insert_at(&mut record, noon()).unwrap();
        assert_eq!(statement.sql(), "INSERT INTO `queries` (`a``b`) VALUES (?);");
    }

    #[test]
    fn test_allow_list_rejects_unknown_column() {
        let uploader = Uploader::default()
            .with_column_policy(ColumnPolicy::allow_list(["state", "date"]));

        let mut ok = LineCodec::decode("state:on").unwrap();
        assert!(uploader.build_insert_at(&mut ok, noon()).is_ok());

        let mut bad = LineCodec::decode("state:on;evil:1").unwrap();
        let err = uploader.build_insert_at(&mut bad, noon()).unwrap_err();
        assert!(matches!(err, UploadError::ColumnRejected { column } if column == "evil"));
    }

    #[test]
    fn test_execute_classifies_failures() {
        let uploader = Uploader::default();
        let mut store = MemoryStore::new();
        store.fail_on("broken");

        let mut record = LineCodec::decode("state:broken").unwrap();
        let err = uploader.upload(&mut store, &mut record).unwrap_err();
        assert!(!err.is_fatal());

        store.disconnect();
        let mut record = LineCodec::decode("state:on").unwrap();
        let err = uploader.upload(&mut store, &mut record).unwrap_err();
        assert!(err.is_fatal());
    }
}
