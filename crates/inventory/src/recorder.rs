//! 디바이스 스냅샷 기록기
//!
//! 수집기가 한 사이클에 보낸 [`SnapshotRecord`] 묶음을 정규화해 디바이스 upsert와
//! 스냅샷 insert로 기록합니다.
//!
//! 1. MAC 정규화에 실패한 레코드는 거부하고 개수를 셉니다.
//! 2. 같은 디바이스의 관측값은 가장 최근 것 하나만 남깁니다.
//! 3. 관측 시각이 속한 월 파티션을 보장합니다.
//! 4. 디바이스별로 기록하며, 한 디바이스의 실패는 나머지에 영향을 주지 않습니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lanwatch_core::metrics as m;
use lanwatch_core::types::{MacAddress, Observation, SnapshotRecord};
use lanwatch_store::{MonthPartition, StreamKind, TelemetryStore};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::InventoryError;
use crate::task::TaskLock;

/// 한 사이클의 기록 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    /// 받은 레코드 수
    pub received: usize,
    /// 기록된 관측값 수
    pub recorded: usize,
    /// 새로 생성된 디바이스 수
    pub created: usize,
    /// MAC이 없거나 잘못되어 거부된 레코드 수
    pub rejected: usize,
    /// 같은 디바이스의 오래된 관측값이라 버려진 수
    pub deduplicated: usize,
    /// 저장 실패로 기록되지 못한 디바이스 수
    pub failed: usize,
    /// 생성에 실패한 파티션 수
    pub partition_failures: usize,
}

/// 누적 기록 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecorderStats {
    /// 처리한 사이클 수
    pub cycles: u64,
    /// 기록된 관측값 누적
    pub recorded_total: u64,
    /// 거부된 레코드 누적
    pub rejected_total: u64,
    /// 기록 실패 누적
    pub failed_total: u64,
    /// 파티션 생성 실패 누적
    pub partition_failures_total: u64,
    /// 마지막 사이클 처리 시각
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// 마지막 사이클의 파티션 생성 에러 (성공하면 지워짐)
    pub last_partition_error: Option<String>,
}

/// 스냅샷 기록기
pub struct SnapshotRecorder<S: TelemetryStore> {
    store: Arc<S>,
    lock: TaskLock,
    stats: Mutex<RecorderStats>,
}

impl<S: TelemetryStore> SnapshotRecorder<S> {
    /// 새 기록기를 생성합니다.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lock: TaskLock::new("snapshot_record"),
            stats: Mutex::new(RecorderStats::default()),
        }
    }

    /// 누적 통계 스냅샷
    pub fn stats(&self) -> RecorderStats {
        self.stats.lock().clone()
    }

    /// 한 사이클의 레코드를 기록합니다.
    ///
    /// 이전 사이클이 아직 기록 중이면 `TaskBusy`를 반환합니다.
    /// 개별 레코드/디바이스 실패는 에러가 아니라 보고서의 개수로 나타납니다.
    pub async fn record_cycle(
        &self,
        records: Vec<SnapshotRecord>,
    ) -> Result<RecordReport, InventoryError> {
        let _guard = self.lock.try_acquire()?;

        let mut report = RecordReport {
            received: records.len(),
            ..RecordReport::default()
        };

        let observations = self.normalize(records, &mut report);

        // 월 파티션 보장: 실패한 달의 관측값은 이번 사이클에서 기록하지 않음
        let months: BTreeSet<MonthPartition> = observations
            .iter()
            .map(|o| MonthPartition::containing(o.observed_at))
            .collect();
        let mut unavailable = BTreeSet::new();
        let mut partition_error = None;
        for month in months {
            if let Err(e) = self
                .store
                .ensure_partition(StreamKind::DeviceSnapshot, month)
                .await
            {
                error!(partition = %month, error = %e, "failed to ensure snapshot partition");
                metrics::counter!(m::STORE_PARTITION_FAILURES_TOTAL, m::LABEL_STREAM => "snapshot")
                    .increment(1);
                report.partition_failures += 1;
                partition_error = Some(e.to_string());
                unavailable.insert(month);
            }
        }

        for observation in &observations {
            if unavailable.contains(&MonthPartition::containing(observation.observed_at)) {
                report.failed += 1;
                continue;
            }
            match self.store.record_observation(observation).await {
                Ok(outcome) => {
                    report.recorded += 1;
                    if outcome.created {
                        report.created += 1;
                        info!(mac = %observation.mac, device_id = outcome.device_id, "new device discovered");
                    }
                }
                Err(e) => {
                    warn!(mac = %observation.mac, error = %e, "failed to record observation");
                    report.failed += 1;
                }
            }
        }

        metrics::counter!(m::INVENTORY_SNAPSHOTS_RECORDED_TOTAL).increment(report.recorded as u64);
        metrics::counter!(m::INVENTORY_DEVICES_CREATED_TOTAL).increment(report.created as u64);
        metrics::counter!(m::INVENTORY_RECORDS_REJECTED_TOTAL).increment(report.rejected as u64);
        metrics::counter!(m::INVENTORY_RECORD_FAILURES_TOTAL).increment(report.failed as u64);

        {
            let mut stats = self.stats.lock();
            stats.cycles += 1;
            stats.recorded_total += report.recorded as u64;
            stats.rejected_total += report.rejected as u64;
            stats.failed_total += report.failed as u64;
            stats.partition_failures_total += report.partition_failures as u64;
            stats.last_cycle_at = Some(Utc::now());
            stats.last_partition_error = partition_error;
        }

        debug!(
            received = report.received,
            recorded = report.recorded,
            created = report.created,
            rejected = report.rejected,
            deduplicated = report.deduplicated,
            failed = report.failed,
            "snapshot cycle recorded"
        );
        Ok(report)
    }

    /// MAC을 정규화하고 디바이스별 최신 관측값만 남깁니다 (관측 시각 오름차순).
    fn normalize(&self, records: Vec<SnapshotRecord>, report: &mut RecordReport) -> Vec<Observation> {
        let mut latest: HashMap<MacAddress, Observation> = HashMap::with_capacity(records.len());

        for record in records {
            let observation = match record.normalize() {
                Ok(o) if o.mac.is_unspecified_or_broadcast() => {
                    warn!(mac = %record.mac, "snapshot record with reserved mac rejected");
                    report.rejected += 1;
                    continue;
                }
                Ok(o) => o,
                Err(e) => {
                    warn!(mac = %record.mac, error = %e, "snapshot record rejected");
                    report.rejected += 1;
                    continue;
                }
            };

            // 같은 시각이면 나중에 온 레코드가 우선
            match latest.get(&observation.mac) {
                Some(existing) if existing.observed_at > observation.observed_at => {
                    report.deduplicated += 1;
                }
                Some(_) => {
                    report.deduplicated += 1;
                    latest.insert(observation.mac, observation);
                }
                None => {
                    latest.insert(observation.mac, observation);
                }
            }
        }

        let mut observations: Vec<Observation> = latest.into_values().collect();
        observations.sort_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.mac.cmp(&b.mac)));
        observations
    }
}
