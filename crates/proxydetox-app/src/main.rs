//! proxydetoxctl - command-line controller for the Proxydetox engine.
//!
//! Reads and writes the persisted settings, supervises the engine process
//! and points the system proxy at it:
//! - `config show | set <key> <value> | reset <key>`
//! - `run` launches the engine and keeps it running until Ctrl-C
//! - `set-system-proxy [--disable]` routes system traffic through the engine

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use proxydetox_storage::{ConfigurationStore, Database, SettingsBackend};
use proxydetox_supervisor::{default_engine_path, ProcessSupervisor};
use proxydetox_sysproxy::{platform_synchronizer, SyncReport};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Proxydetox controller
#[derive(Parser, Debug)]
#[command(name = "proxydetoxctl", version, about)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Settings database (defaults to the app data directory)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Launch the engine and supervise it until Ctrl-C
    Run {
        /// Engine executable (defaults to `proxydetox` next to this binary)
        #[arg(long)]
        engine: Option<PathBuf>,

        /// Point the system proxy at the engine while it runs
        #[arg(long)]
        system_proxy: bool,

        /// Seconds to wait for the engine to exit before killing it
        #[arg(long)]
        stop_timeout: Option<u64>,
    },

    /// Point the system proxy at the configured port
    SetSystemProxy {
        /// Turn the system HTTP/HTTPS proxy off instead
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print all settings as JSON
    Show,
    /// Store a setting
    Set {
        /// Setting name, e.g. Port or Negotiate
        key: String,
        /// New value
        value: String,
    },
    /// Remove a stored setting so it reads as its default
    Reset {
        /// Setting name
        key: String,
    },
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("cc", "colorto", "Proxydetox").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "proxydetoxctl={l},proxydetox_storage={l},proxydetox_supervisor={l},proxydetox_sysproxy={l},warn",
            l = log_level
        ))
    });
    let console = args.debug || matches!(args.command, Command::Run { .. });

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("proxydetoxctl")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if console {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stderr))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    // Keep stdout clean for command output.
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::debug!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn open_store(path: Option<PathBuf>) -> Result<ConfigurationStore<Database>> {
    let db = match path {
        Some(path) => Database::with_path(path),
        None => Database::new(),
    }
    .context("failed to open settings database")?;

    Ok(ConfigurationStore::new(db))
}

fn show_config<B: SettingsBackend>(
    store: &ConfigurationStore<B>,
    out: &mut impl Write,
) -> Result<()> {
    let json = serde_json::to_string_pretty(&store.snapshot())?;
    writeln!(out, "{}", json)?;
    Ok(())
}

fn handle_config<B: SettingsBackend>(
    store: &ConfigurationStore<B>,
    action: ConfigAction,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(store, out),
        ConfigAction::Set { key, value } => {
            store
                .set_from_str(&key, &value)
                .with_context(|| format!("failed to set {}", key))?;
            tracing::info!("Set {} = {}", key, value);
            Ok(())
        }
        ConfigAction::Reset { key } => {
            if store.reset(&key)? {
                tracing::info!("Reset {} to its default", key);
            }
            Ok(())
        }
    }
}

/// Runs the synchronizer on a blocking thread; it may wait on an
/// authorization prompt.
async fn sync_system_proxy(port: u16) -> Result<SyncReport> {
    let report = tokio::task::spawn_blocking(move || platform_synchronizer().run(port))
        .await
        .context("system proxy task failed")??;

    for outcome in &report.outcomes {
        if let Some(e) = &outcome.error {
            tracing::warn!("{}", e);
        }
    }
    Ok(report)
}

async fn run_engine(
    store: ConfigurationStore<Database>,
    engine: Option<PathBuf>,
    system_proxy: bool,
    stop_timeout: Option<u64>,
) -> Result<()> {
    let engine = match engine {
        Some(path) => path,
        None => default_engine_path()?,
    };
    let mut supervisor = ProcessSupervisor::new(Arc::new(store), engine);
    if let Some(secs) = stop_timeout {
        supervisor = supervisor.with_stop_timeout(Duration::from_secs(secs));
    }

    let pid = supervisor.start()?;
    let port = supervisor.store().port();
    tracing::info!("Engine running on port {} (pid {})", port, pid);

    if system_proxy {
        if let Err(e) = sync_system_proxy(port).await {
            tracing::error!("Failed to set system proxy: {:#}", e);
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, stopping engine");
                break;
            }
            _ = ticker.tick() => {
                if !supervisor.is_running() {
                    match supervisor.last_exit() {
                        Some(exit) => tracing::warn!("Engine exited with status {}", exit.status),
                        None => tracing::warn!("Engine exited"),
                    }
                    break;
                }
            }
        }
    }

    if system_proxy {
        if let Err(e) = sync_system_proxy(0).await {
            tracing::error!("Failed to reset system proxy: {:#}", e);
        }
    }

    tokio::task::spawn_blocking(move || supervisor.stop())
        .await
        .context("engine stop task failed")??;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let store = open_store(args.database)?;

    match args.command {
        Command::Config { action } => {
            let mut stdout = std::io::stdout().lock();
            handle_config(&store, action, &mut stdout)?;
        }
        Command::Run {
            engine,
            system_proxy,
            stop_timeout,
        } => {
            run_engine(store, engine, system_proxy, stop_timeout).await?;
        }
        Command::SetSystemProxy { disable } => {
            let port = if disable { 0 } else { store.port() };
            let report = sync_system_proxy(port).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
