//! Module orchestration -- assembly, wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `lanwatch-daemon`.
//! It loads configuration, opens the shared telemetry store, builds the
//! enabled modules, manages startup/shutdown ordering, and runs the main
//! loop until a shutdown signal arrives.
//!
//! # Startup Order (producers before consumers)
//!
//! 1. Syslog ingestion (writes syslog events and the syslog watermark)
//! 2. Inventory engine (records snapshots, reads syslog for correlation)
//!
//! # Shutdown Order (same as startup - producers first)
//!
//! 1. Syslog ingestion (close socket, flush backlog within the grace period)
//! 2. Inventory engine (drain the snapshot feed, stop periodic tasks)
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: graceful shutdown
//! - `SIGHUP`: reload per-cycle settings (retention, thresholds, correlation
//!   toggle) from the config file. Other sections need a restart.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use lanwatch_core::config::LanwatchConfig;
use lanwatch_core::settings::{CycleSettings, SettingsHandle};
use lanwatch_inventory::{QueryService, SnapshotFeed};
use lanwatch_store::{SqliteStore, StoreSettings};

use crate::health::{self, DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// Interval between aggregated health log lines.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Extra time on top of the syslog grace period before a stop is abandoned.
const STOP_MARGIN: Duration = Duration::from_secs(5);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LanwatchConfig,
    /// Config file path, when loaded from disk (enables SIGHUP reload).
    config_path: Option<PathBuf>,
    /// Registered modules, producers first.
    modules: ModuleRegistry,
    /// Per-cycle settings shared with the inventory engine.
    settings: SettingsHandle,
    /// Snapshot submission channel, when inventory is enabled.
    feed: Option<SnapshotFeed>,
    /// Query surface, when inventory is enabled.
    query: Option<QueryService<SqliteStore>>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// Environment overrides are applied by the loader.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LanwatchConfig::load(config_path)
            .await
            .with_context(|| format!("failed to load config {}", config_path.display()))?;
        let mut orchestrator = Self::build_from_config(config).await?;
        orchestrator.set_config_path(config_path.to_path_buf());
        Ok(orchestrator)
    }

    /// Remember the config file so SIGHUP can reload cycle settings from it.
    pub fn set_config_path(&mut self, path: PathBuf) {
        self.config_path = Some(path);
    }

    /// Build from an already-loaded configuration.
    ///
    /// The store is opened (and its schema checked) before any module is
    /// built. Every module persists to the store, so a store that cannot be
    /// opened stops the daemon from starting.
    pub async fn build_from_config(config: LanwatchConfig) -> Result<Self> {
        config.validate().context("config validation failed")?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let settings = SettingsHandle::new(CycleSettings::from_config(&config));
        let (shutdown_tx, _) = broadcast::channel(16);
        let mut registry = ModuleRegistry::new();
        let mut feed = None;
        let mut query = None;

        if config.syslog.enabled || config.inventory.enabled {
            let store = open_store(&config).await?;

            let syslog = modules::syslog::init(&config, Arc::clone(&store))?;
            let monitor = syslog.as_ref().map(|m| Arc::clone(&m.monitor));
            if let Some(module) = syslog {
                registry.register(module.handle);
            }

            if let Some(module) =
                modules::inventory::init(&config, store, settings.clone(), monitor)?
            {
                feed = Some(module.feed);
                query = Some(module.query);
                registry.register(module.handle);
            }
        } else {
            tracing::warn!("all modules are disabled in configuration");
        }

        tracing::info!(
            modules = ?registry.names(),
            enabled = registry.enabled_count(),
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            config_path: None,
            modules: registry,
            settings,
            feed,
            query,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all enabled modules and run until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start all enabled modules and run until `shutdown` resolves.
    ///
    /// `shutdown` yields the name of the trigger for logging.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        if self.modules.enabled_count() == 0 {
            return Err(anyhow::anyhow!("no module is enabled, nothing to run"));
        }

        let pid_file = self.pid_file();
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        tracing::info!("starting all modules");
        let started = match self.modules.start_all().await {
            Ok(n) => n,
            Err(e) => {
                if let Some(path) = &pid_file {
                    remove_pid_file(path);
                }
                return Err(e);
            }
        };
        tracing::info!(
            running = started,
            enabled = self.modules.enabled_count(),
            "lanwatch-daemon running"
        );

        let mut uptime_updater_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        let loop_result = self.main_loop(shutdown).await;

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_updater_task.take() {
            let _ = task.await;
        }

        let stop_result = self.shutdown().await;

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }

        loop_result.and(stop_result)
    }

    async fn main_loop<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let mut reload = reload_signal()?;
        let mut health_tick = tokio::time::interval(HEALTH_LOG_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    let signal = signal?;
                    tracing::info!(signal, "shutdown signal received");
                    return Ok(());
                }
                _ = health_tick.tick() => {
                    health::log_report(&self.health().await);
                }
                Some(()) = reload.recv() => {
                    self.reload_settings().await;
                }
            }
        }
    }

    /// Stop all modules, producers first.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        let grace = self
            .config
            .syslog
            .shutdown_grace_secs
            .max(self.config.inventory.shutdown_grace_secs);
        let timeout = Duration::from_secs(grace) + STOP_MARGIN;
        self.modules.stop_all(timeout).await
    }

    /// Re-read the config file and publish new cycle settings.
    ///
    /// Components pick the new values up at their next cycle start.
    /// A bad file leaves the current settings in place.
    pub async fn reload_settings(&self) {
        let Some(path) = &self.config_path else {
            tracing::warn!("settings reload requested but the daemon has no config file");
            return;
        };

        let next = match LanwatchConfig::load(path).await {
            Ok(config) => CycleSettings::from_config(&config),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "settings reload failed");
                return;
            }
        };

        match self.settings.update(next.clone()) {
            Ok(()) => tracing::info!(
                snapshot_retention_days = next.snapshot_retention_days,
                syslog_retention_days = next.syslog_retention_days,
                inactivity_threshold_mins = next.inactivity_threshold_mins,
                correlation_enabled = next.correlation_enabled,
                "cycle settings reloaded"
            ),
            Err(e) => tracing::error!(error = %e, "reloaded settings rejected"),
        }
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth {
                name,
                enabled,
                status,
            })
            .collect();

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &LanwatchConfig {
        &self.config
    }

    /// Per-cycle settings handle.
    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Snapshot submission channel for in-process collectors.
    pub fn feed(&self) -> Option<SnapshotFeed> {
        self.feed.clone()
    }

    /// Query surface for the presentation layer.
    pub fn query(&self) -> Option<QueryService<SqliteStore>> {
        self.query.clone()
    }

    /// Registered module names in start order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.names()
    }

    fn pid_file(&self) -> Option<PathBuf> {
        let path = &self.config.general.pid_file;
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

async fn open_store(config: &LanwatchConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(StoreSettings::from_core(&config.store))
        .await
        .with_context(|| format!("failed to open telemetry store {}", config.store.path))?;
    tracing::info!(path = %config.store.path, "telemetry store opened");
    Ok(Arc::new(store))
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

fn reload_signal() -> Result<tokio::signal::unix::Signal> {
    use tokio::signal::unix::{SignalKind, signal};

    signal(SignalKind::hangup()).map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file (prevents symlink attacks)
/// - Creates parent directory with restrictive permissions (0o700)
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    use lanwatch_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use lanwatch_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
