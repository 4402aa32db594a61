//! Module registry and initialization.
//!
//! Each lanwatch crate is wrapped as a [`ModuleHandle`] that provides
//! uniform lifecycle management via the [`DynPipeline`] trait.
//!
//! The [`ModuleRegistry`] tracks all registered modules and supports
//! ordered start/stop operations. A module that fails to start does not
//! prevent independent modules from running.

pub mod inventory;
pub mod syslog;

use std::time::Duration;

use lanwatch_core::pipeline::{DynPipeline, HealthStatus};

/// A handle to a registered module.
///
/// Wraps a `Box<dyn DynPipeline>` with metadata (name, enabled flag).
pub struct ModuleHandle {
    /// Module name for logging and health reporting.
    pub name: String,
    /// Whether this module is enabled in configuration.
    pub enabled: bool,
    /// The module's pipeline implementation (start/stop/health_check).
    pub pipeline: Box<dyn DynPipeline>,
    running: bool,
    start_error: Option<String>,
}

impl ModuleHandle {
    /// Create a new module handle.
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
            running: false,
            start_error: None,
        }
    }

    /// Whether the module was started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Check the module's health status.
    ///
    /// Disabled modules always report `Healthy` (they are not expected to run).
    /// A module whose start failed reports `Unhealthy` with the start error.
    pub async fn health_check(&self) -> HealthStatus {
        if !self.enabled {
            return HealthStatus::Healthy;
        }
        if let Some(err) = &self.start_error {
            return HealthStatus::Unhealthy(format!("not started: {err}"));
        }
        self.pipeline.health_check().await
    }
}

/// Registry of all lanwatch modules.
pub struct ModuleRegistry {
    /// Modules in registration order (producers before consumers).
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module.
    ///
    /// Modules should be registered in dependency order:
    /// producers first, consumers last.
    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Start all enabled modules in registration order.
    ///
    /// A failing module is logged, marked unhealthy and skipped; the rest
    /// keep starting. Returns the number of running modules, or an error
    /// when enabled modules exist but none of them could start.
    pub async fn start_all(&mut self) -> anyhow::Result<usize> {
        let mut started = 0;
        let mut failures = Vec::new();

        for handle in &mut self.modules {
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                continue;
            }
            if handle.running {
                started += 1;
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            match handle.pipeline.start().await {
                Ok(()) => {
                    handle.running = true;
                    handle.start_error = None;
                    started += 1;
                    tracing::info!(module = %handle.name, "module started successfully");
                }
                Err(e) => {
                    tracing::error!(
                        module = %handle.name,
                        error = %e,
                        "module failed to start, continuing without it"
                    );
                    handle.start_error = Some(e.to_string());
                    failures.push(format!("{}: {}", handle.name, e));
                }
            }
        }

        if started == 0 && !failures.is_empty() {
            return Err(anyhow::anyhow!(
                "no module could start: {}",
                failures.join("; ")
            ));
        }

        Ok(started)
    }

    /// Stop all running modules in registration order.
    ///
    /// Producers stop first so consumers can finish with what was already
    /// persisted. Each stop is bounded by `timeout`. Logs errors but
    /// continues stopping remaining modules.
    pub async fn stop_all(&mut self, timeout: Duration) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for handle in &mut self.modules {
            if !handle.running {
                continue;
            }

            tracing::info!(module = %handle.name, "stopping module");
            match tokio::time::timeout(timeout, handle.pipeline.stop()).await {
                Ok(Ok(())) => {
                    tracing::info!(module = %handle.name, "module stopped successfully");
                }
                Ok(Err(e)) => {
                    tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                    errors.push(format!("{}: {}", handle.name, e));
                }
                Err(_) => {
                    tracing::error!(
                        module = %handle.name,
                        timeout_secs = timeout.as_secs(),
                        "module did not stop within the grace period"
                    );
                    errors.push(format!("{}: stop timed out", handle.name));
                }
            }
            handle.running = false;
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }

        Ok(())
    }

    /// Get health status for all modules.
    pub async fn health_statuses(&self) -> Vec<(String, bool, HealthStatus)> {
        let mut statuses = Vec::new();
        for handle in &self.modules {
            let status = handle.health_check().await;
            statuses.push((handle.name.clone(), handle.enabled, status));
        }
        statuses
    }

    /// Registered module names in order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Number of enabled modules.
    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }

    /// Number of running modules.
    pub fn running_count(&self) -> usize {
        self.modules.iter().filter(|m| m.running).count()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
