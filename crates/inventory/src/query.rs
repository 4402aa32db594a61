//! 조회/변경 서비스
//!
//! 표현 계층이 사용하는 읽기 전용 조회와 운영자 메타데이터 변경을 제공합니다.
//! 디바이스는 어떤 MAC 표기로든 찾을 수 있습니다.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lanwatch_core::pipeline::IngestHealthSource;
use lanwatch_core::types::{
    Device, DeviceCounts, DeviceFilter, DeviceMetadataUpdate, DeviceSnapshot, IngestHealth,
    LinkedEvent, MacAddress,
};
use lanwatch_store::TelemetryStore;
use tracing::info;

use crate::error::InventoryError;

/// 한 번에 돌려주는 최대 행 수
pub const MAX_QUERY_LIMIT: usize = 10_000;

/// 스냅샷 시계열 조회 최대 구간 (일)
pub const MAX_SNAPSHOT_WINDOW_DAYS: i64 = 31;

/// 닉네임/위치 최대 길이
const MAX_LABEL_LEN: usize = 128;

/// 디바이스당 최대 태그 수
const MAX_TAGS: usize = 32;

/// 인벤토리 조회 서비스
pub struct QueryService<S: TelemetryStore> {
    store: Arc<S>,
    ingest: Option<Arc<dyn IngestHealthSource>>,
}

impl<S: TelemetryStore> Clone for QueryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ingest: self.ingest.clone(),
        }
    }
}

impl<S: TelemetryStore> QueryService<S> {
    /// 새 조회 서비스를 생성합니다.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            ingest: None,
        }
    }

    /// syslog 수집 상태 제공자를 연결합니다.
    pub fn with_ingest_source(mut self, source: Arc<dyn IngestHealthSource>) -> Self {
        self.ingest = Some(source);
        self
    }

    /// 필터에 맞는 디바이스 목록
    pub async fn devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, InventoryError> {
        Ok(self.store.list_devices(filter).await?)
    }

    /// 디바이스 한 대
    pub async fn device(&self, mac: &str) -> Result<Option<Device>, InventoryError> {
        let mac = MacAddress::parse(mac)?;
        Ok(self.store.find_device(mac).await?)
    }

    /// 디바이스 스냅샷 시계열 `[from, to)`
    pub async fn snapshots(
        &self,
        mac: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeviceSnapshot>, InventoryError> {
        if from >= to {
            return Err(InventoryError::InvalidQuery(format!(
                "window start {from} is not before end {to}"
            )));
        }
        if to - from > Duration::days(MAX_SNAPSHOT_WINDOW_DAYS) {
            return Err(InventoryError::InvalidQuery(format!(
                "window exceeds {MAX_SNAPSHOT_WINDOW_DAYS} days"
            )));
        }
        let device = self.require_device(mac).await?;
        Ok(self
            .store
            .device_snapshots(device.id, from, to, clamp_limit(limit))
            .await?)
    }

    /// 디바이스에 연결된 syslog 이벤트 (최신 순)
    pub async fn events(&self, mac: &str, limit: usize) -> Result<Vec<LinkedEvent>, InventoryError> {
        let device = self.require_device(mac).await?;
        Ok(self.store.device_events(device.id, clamp_limit(limit)).await?)
    }

    /// 전체/온라인/오프라인/인터페이스별 집계
    pub async fn counts(&self) -> Result<DeviceCounts, InventoryError> {
        Ok(self.store.device_counts().await?)
    }

    /// 수집 경로 상태. syslog 수집이 꺼져 있으면 `None`.
    pub fn ingest_health(&self) -> Option<IngestHealth> {
        self.ingest.as_ref().map(|source| source.ingest_health())
    }

    /// 닉네임/위치/태그를 변경합니다. 식별자와 시계열은 바뀌지 않습니다.
    pub async fn update_metadata(
        &self,
        mac: &str,
        update: &DeviceMetadataUpdate,
    ) -> Result<Device, InventoryError> {
        validate_update(update)?;
        let parsed = MacAddress::parse(mac)?;
        let device = self
            .store
            .update_device_metadata(parsed, update)
            .await?
            .ok_or_else(|| InventoryError::DeviceNotFound(parsed.to_string()))?;
        info!(mac = %parsed, "device metadata updated");
        Ok(device)
    }

    async fn require_device(&self, mac: &str) -> Result<Device, InventoryError> {
        let parsed = MacAddress::parse(mac)?;
        self.store
            .find_device(parsed)
            .await?
            .ok_or_else(|| InventoryError::DeviceNotFound(parsed.to_string()))
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_LIMIT)
}

fn validate_update(update: &DeviceMetadataUpdate) -> Result<(), InventoryError> {
    if update.is_empty() {
        return Err(InventoryError::InvalidQuery("metadata update is empty".to_owned()));
    }
    for (field, value) in [("nickname", &update.nickname), ("location", &update.location)] {
        if let Some(v) = value
            && v.chars().count() > MAX_LABEL_LEN
        {
            return Err(InventoryError::InvalidQuery(format!(
                "{field} longer than {MAX_LABEL_LEN} characters"
            )));
        }
    }
    if let Some(tags) = &update.tags
        && tags.len() > MAX_TAGS
    {
        return Err(InventoryError::InvalidQuery(format!(
            "more than {MAX_TAGS} tags"
        )));
    }
    Ok(())
}
