//! CLI argument definitions for bufsql.

use std::path::PathBuf;

use bufsql::config::{ConfigError, ConfigLayer, DEFAULT_CONFIG_FILE};
use clap::Parser;

/// Uploads buffer file contents to a database.
///
/// Every cycle the buffer file is drained, each `key:value;key:value` line is
/// inserted as one row, and lines that cannot be parsed are put back.
/// Settings not given on the command line are read from the config file.
///
/// ## Examples
///
/// First run, everything on the command line:
///   bufsql -a 10.0.0.5 -u line-3 -p secret -f buffer.txt -l history.log
///
/// Check a buffer file without a database:
///   bufsql --dry-run -f buffer.txt
#[derive(Parser, Debug)]
#[command(name = "bufsql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    // === Files ===
    /// Config file with `key = value` settings
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE, env = "BUFSQL_CONFIG")]
    pub config: PathBuf,

    /// Buffer file written by the production line
    #[arg(short = 'f', long, env = "BUFSQL_FILEPATH")]
    pub filepath: Option<String>,

    /// Append successfully sent lines to this file
    #[arg(short = 'l', long, env = "BUFSQL_LOGFILE")]
    pub logfile: Option<String>,

    // === Database ===
    /// Database host
    #[arg(short = 'a', long, env = "BUFSQL_ADDRESS")]
    pub address: Option<String>,

    /// Database port
    #[arg(long, env = "BUFSQL_PORT")]
    pub port: Option<String>,

    /// Database user; also the country code looked up at startup
    #[arg(short = 'u', long, env = "BUFSQL_USERNAME")]
    pub username: Option<String>,

    /// Database password
    #[arg(short = 'p', long, env = "BUFSQL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name
    #[arg(short = 'd', long, env = "BUFSQL_DBNAME")]
    pub dbname: Option<String>,

    /// Target table
    #[arg(short = 't', long, env = "BUFSQL_TABLE")]
    pub table: Option<String>,

    // === Processing ===
    /// Seconds between cycles
    #[arg(short = 'i', long)]
    pub interval: Option<String>,

    /// How values are sent to the database
    #[arg(long, value_parser = ["parameterized", "literal"])]
    pub bind_mode: Option<String>,

    /// What to do with a repeat of a line that already failed to parse
    #[arg(long, value_parser = ["drop", "retain"])]
    pub on_known_failure: Option<String>,

    /// What to do with a line whose insert was rejected
    #[arg(long, value_parser = ["drop", "requeue"])]
    pub on_write_failure: Option<String>,

    /// How many failed lines to remember (0 = no limit)
    #[arg(long)]
    pub failure_capacity: Option<String>,

    /// Only allow these columns (repeatable)
    #[arg(long = "allow-column", value_name = "COLUMN")]
    pub allow_columns: Vec<String>,

    // === Dry run ===
    /// Log statements instead of sending them to a database
    #[arg(long)]
    pub dry_run: bool,

    /// Country code used in dry-run mode
    #[arg(long, default_value_t = 0)]
    pub country_code: i64,

    // === Logging ===
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Flags given on the command line, as a settings layer.
    pub fn overrides(&self) -> Result<ConfigLayer, ConfigError> {
        let mut layer = ConfigLayer::new();
        let pairs = [
            ("filepath", &self.filepath),
            ("logfile", &self.logfile),
            ("address", &self.address),
            ("port", &self.port),
            ("username", &self.username),
            ("password", &self.password),
            ("dbname", &self.dbname),
            ("table", &self.table),
            ("interval", &self.interval),
            ("bind_mode", &self.bind_mode),
            ("known_failures", &self.on_known_failure),
            ("write_failures", &self.on_write_failure),
            ("failure_capacity", &self.failure_capacity),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                layer.set(key, value.as_str())?;
            }
        }
        if !self.allow_columns.is_empty() {
            layer.set("allowed_columns", self.allow_columns.join(","))?;
        }
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_become_layer() {
        let cli = Cli::parse_from([
            "bufsql",
            "-f",
            "buffer.txt",
            "-u",
            "line-3",
            "--on-write-failure",
            "requeue",
            "--allow-column",
            "state",
            "--allow-column",
            "date",
        ]);
        let layer = cli.overrides().unwrap();

        assert_eq!(layer.get("filepath"), Some("buffer.txt"));
        assert_eq!(layer.get("username"), Some("line-3"));
        assert_eq!(layer.get("write_failures"), Some("requeue"));
        assert_eq!(layer.get("allowed_columns"), Some("state,date"));
        assert_eq!(layer.get("address"), None);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = Cli::try_parse_from(["bufsql", "--on-known-failure", "ignore"]);
        assert!(result.is_err());
    }
}
