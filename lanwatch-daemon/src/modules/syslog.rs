//! Syslog ingestion module initialization.
//!
//! Converts `LanwatchConfig.syslog` into a `PipelineConfig`, builds the
//! `SyslogPipeline` on top of the shared store and wraps it in a
//! `ModuleHandle`.
//!
//! # Data Flow
//!
//! ```text
//! UDP :514 --> SyslogUdpCollector --> backlog --> BatchWriter --> store
//!                                        |
//!                                        +--> IngestMonitor --> inventory queries
//! ```

use std::sync::Arc;

use anyhow::Result;

use lanwatch_core::config::LanwatchConfig;
use lanwatch_core::pipeline::IngestHealthSource;
use lanwatch_log_pipeline::{PipelineConfig, SyslogPipelineBuilder};
use lanwatch_store::{RetryPolicy, SqliteStore};

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "syslog";

/// An initialized syslog module.
pub struct SyslogModule {
    /// Lifecycle handle for the registry.
    pub handle: ModuleHandle,
    /// Ingest health view shared with the query layer.
    pub monitor: Arc<dyn IngestHealthSource>,
}

/// Initialize the syslog ingestion module.
///
/// # Returns
///
/// * `Ok(Some(SyslogModule))` - Pipeline built and ready to start
/// * `Ok(None)` - Module disabled in configuration
/// * `Err(_)` - Initialization failed
pub fn init(config: &LanwatchConfig, store: Arc<SqliteStore>) -> Result<Option<SyslogModule>> {
    if !config.syslog.enabled {
        tracing::info!("syslog ingestion disabled in configuration");
        return Ok(None);
    }

    tracing::info!(bind = %config.syslog.bind, "initializing syslog ingestion");

    let pipeline = SyslogPipelineBuilder::new()
        .config(PipelineConfig::from_core(&config.syslog))
        .sink(store)
        .retry(RetryPolicy::from_config(&config.store))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build syslog pipeline: {}", e))?;

    let monitor: Arc<dyn IngestHealthSource> = Arc::new(pipeline.monitor());
    let handle = ModuleHandle::new(MODULE_NAME, true, Box::new(pipeline));

    Ok(Some(SyslogModule { handle, monitor }))
}
