//! 활동 상태 스윕
//!
//! 디바이스 상태 머신은 Online -> (임계값 안에 스냅샷 없음) -> Offline -> (새 스냅샷) -> Online
//! 입니다. Online 전이는 스냅샷 기록 시 저장소가 처리하고, 여기서는 Offline 전이만 다룹니다.
//!
//! 경계는 포함입니다: `now - last_seen == threshold`인 디바이스는 아직 온라인입니다.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lanwatch_core::metrics as m;
use lanwatch_core::settings::CycleSettings;
use lanwatch_core::types::{ActivityState, MacAddress};
use lanwatch_store::TelemetryStore;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::InventoryError;
use crate::task::TaskLock;

/// 마지막 관측 시각과 임계값으로 활동 상태를 판정합니다.
pub fn evaluate(last_seen: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> ActivityState {
    if last_seen < inactivity_cutoff(now, threshold) {
        ActivityState::Offline
    } else {
        ActivityState::Online
    }
}

/// 이 시각보다 먼저 마지막으로 관측된 디바이스가 오프라인 대상입니다.
pub fn inactivity_cutoff(now: DateTime<Utc>, threshold: Duration) -> DateTime<Utc> {
    now - threshold
}

/// 한 번의 스윕 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 적용한 기준 시각
    pub cutoff: DateTime<Utc>,
    /// 이번 스윕에서 오프라인으로 바뀐 디바이스
    pub marked_offline: Vec<MacAddress>,
    /// 스윕 후 온라인 디바이스 수
    pub online: Option<u64>,
}

/// 활동 상태 스위퍼
pub struct ActivitySweeper<S: TelemetryStore> {
    store: Arc<S>,
    lock: TaskLock,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl<S: TelemetryStore> ActivitySweeper<S> {
    /// 새 스위퍼를 생성합니다.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lock: TaskLock::new("activity_sweep"),
            last_sweep: Mutex::new(None),
        }
    }

    /// 마지막으로 성공한 스윕 시각
    pub fn last_sweep(&self) -> Option<DateTime<Utc>> {
        *self.last_sweep.lock()
    }

    /// 임계값을 넘긴 온라인 디바이스를 오프라인으로 표시합니다. 여러 번 실행해도 결과는 같습니다.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        settings: &CycleSettings,
    ) -> Result<SweepReport, InventoryError> {
        let _guard = self.lock.try_acquire()?;

        let cutoff = inactivity_cutoff(now, settings.inactivity_threshold());
        let marked_offline = self.store.mark_inactive(cutoff).await?;

        for mac in &marked_offline {
            info!(mac = %mac, cutoff = %cutoff, "device went offline");
        }
        metrics::counter!(m::INVENTORY_DEVICES_OFFLINE_TOTAL).increment(marked_offline.len() as u64);

        // 집계 실패는 스윕 결과에 영향을 주지 않음
        let online = match self.store.device_counts().await {
            Ok(counts) => {
                metrics::gauge!(m::INVENTORY_DEVICES_ONLINE).set(counts.online as f64);
                Some(counts.online)
            }
            Err(e) => {
                warn!(error = %e, "failed to refresh online device count");
                None
            }
        };

        *self.last_sweep.lock() = Some(now);
        debug!(cutoff = %cutoff, transitioned = marked_offline.len(), "activity sweep done");

        Ok(SweepReport {
            cutoff,
            marked_offline,
            online,
        })
    }
}
