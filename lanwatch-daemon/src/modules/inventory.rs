//! Inventory engine module initialization.
//!
//! Builds the `InventoryService` (snapshot recording, activity sweep,
//! correlation, retention) on the shared store. The module hands back the
//! snapshot feed for collectors and the query service for the
//! presentation layer.

use std::sync::Arc;

use anyhow::Result;

use lanwatch_core::config::LanwatchConfig;
use lanwatch_core::pipeline::IngestHealthSource;
use lanwatch_core::settings::SettingsHandle;
use lanwatch_inventory::{EngineConfig, InventoryServiceBuilder, QueryService, SnapshotFeed};
use lanwatch_store::SqliteStore;

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "inventory";

/// An initialized inventory module.
pub struct InventoryModule {
    /// Lifecycle handle for the registry.
    pub handle: ModuleHandle,
    /// Collector-facing snapshot submission channel.
    pub feed: SnapshotFeed,
    /// Read/mutation surface over devices and telemetry.
    pub query: QueryService<SqliteStore>,
}

/// Initialize the inventory module.
///
/// `ingest` is the syslog module's health view, when syslog is enabled.
pub fn init(
    config: &LanwatchConfig,
    store: Arc<SqliteStore>,
    settings: SettingsHandle,
    ingest: Option<Arc<dyn IngestHealthSource>>,
) -> Result<Option<InventoryModule>> {
    if !config.inventory.enabled {
        tracing::info!("inventory engine disabled in configuration");
        return Ok(None);
    }

    tracing::info!("initializing inventory engine");

    let mut builder = InventoryServiceBuilder::new()
        .config(EngineConfig::from_core(config))
        .store(store)
        .settings(settings);
    if let Some(source) = ingest {
        builder = builder.ingest_source(source);
    }

    let service = builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build inventory engine: {}", e))?;

    let feed = service.feed();
    let query = service.query();
    let handle = ModuleHandle::new(MODULE_NAME, true, Box::new(service));

    Ok(Some(InventoryModule {
        handle,
        feed,
        query,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use lanwatch_core::settings::CycleSettings;
    use lanwatch_core::types::IngestHealth;
    use lanwatch_store::StoreSettings;

    struct Quiet;

    impl IngestHealthSource for Quiet {
        fn ingest_health(&self) -> IngestHealth {
            IngestHealth::default()
        }
    }

    async fn store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
        Arc::new(
            SqliteStore::open(StoreSettings::at(dir.path().join("inventory.db")))
                .await
                .unwrap(),
        )
    }

    fn settings(config: &LanwatchConfig) -> SettingsHandle {
        SettingsHandle::new(CycleSettings::from_config(config))
    }

    #[tokio::test]
    async fn disabled_module_is_not_built() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LanwatchConfig::default();
        config.inventory.enabled = false;

        let module = init(&config, store(&dir).await, settings(&config), None).unwrap();
        assert!(module.is_none());
    }

    #[tokio::test]
    async fn query_sees_ingest_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = LanwatchConfig::default();

        let without = init(&config, store(&dir).await, settings(&config), None)
            .unwrap()
            .unwrap();
        assert!(without.query.ingest_health().is_none());

        let with = init(
            &config,
            store(&dir).await,
            settings(&config),
            Some(Arc::new(Quiet)),
        )
        .unwrap()
        .unwrap();
        assert!(with.query.ingest_health().is_some());
        assert_eq!(with.handle.name, MODULE_NAME);
        assert!(!with.feed.is_closed());
    }
}
