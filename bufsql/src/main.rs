//! bufsql CLI
//!
//! Monitors a buffer file and uploads its lines until Ctrl-C.

use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::Context;
use bufsql::{
    BufferStore, ConfigError, ConfigLayer, HistoryLog, IngestionCycle, MemoryStore, Monitor,
    Settings, Store,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod args;

use args::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let settings = load_settings(&cli)?;
    info!(?settings, "settings resolved");

    if cli.dry_run {
        let buffer = BufferStore::open(&settings.filepath)?;
        monitor(&settings, buffer, MemoryStore::new().with_echo(), cli.country_code)?;
        return Ok(());
    }

    run_mysql(&settings)
}

#[cfg(feature = "mysql")]
fn run_mysql(settings: &Settings) -> anyhow::Result<()> {
    use bufsql::{resolve_country_code, MySqlSyncStore};

    let mut store = MySqlSyncStore::connect(settings.connect_options())
        .with_context(|| format!("could not establish connection to {}", settings.address))?;

    let buffer = BufferStore::open(&settings.filepath)?;
    let country_code = resolve_country_code(&mut store, &settings.username)?;
    info!(country_code, "resolved country code");

    let store = monitor(settings, buffer, store, country_code)?;
    store.close().context("closing database connection")?;
    Ok(())
}

#[cfg(not(feature = "mysql"))]
fn run_mysql(_settings: &Settings) -> anyhow::Result<()> {
    anyhow::bail!("built without the `mysql` feature; only --dry-run is available")
}

/// Drive cycles until Ctrl-C, then hand the store back for closing.
fn monitor<S: Store>(
    settings: &Settings,
    buffer: BufferStore,
    store: S,
    country_code: i64,
) -> anyhow::Result<S> {
    let mut cycle = IngestionCycle::new(buffer, store, settings.uploader(), country_code)
        .with_tracker(settings.tracker())
        .with_known_failure_policy(settings.known_failures)
        .with_write_failure_policy(settings.write_failures);
    if let Some(logfile) = &settings.logfile {
        let history = HistoryLog::open(logfile)
            .with_context(|| format!("logfile {} is not writable", logfile.display()))?;
        cycle = cycle.with_history(history);
    }

    let mut monitor = Monitor::new(cycle, settings.interval);
    let running = monitor.running();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    println!("Monitoring {} [CTRL+C to exit] ...", settings.filepath.display());
    let total = monitor.run()?;
    println!("Monitoring ended");
    info!(total, "records sent this session");

    Ok(monitor.into_cycle().into_store())
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut layer = ConfigLayer::defaults();
    match ConfigLayer::load(&cli.config) {
        Ok((file, warnings)) => {
            for warning in warnings {
                warn!(path = %cli.config.display(), "{warning}");
            }
            layer.merge(file);
        }
        Err(ConfigError::Io { path, source }) => {
            warn!(path = %path.display(), error = %source, "config file doesn't exist or could not be read");
        }
        Err(e) => return Err(e.into()),
    }
    layer.merge(cli.overrides()?);

    let base_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let settings = layer.resolve(base_dir, !cli.dry_run)?;
    Ok(settings)
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout carries the sent counts
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
