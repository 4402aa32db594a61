//! 보존 기간 및 파티션 관리
//!
//! 한 번의 실행은 다음 순서로 진행됩니다.
//!
//! 1. 두 스트림 모두 이번 달과 다음 달 파티션을 보장 (실패 시 error 로그, 메트릭, 상태 저하)
//! 2. 기준 시각보다 완전히 오래된 파티션은 통째로 삭제
//! 3. 기준 시각에 걸친 파티션은 행 단위로 정리
//! 4. 삭제된 syslog 이벤트의 상관 링크 삭제
//!
//! 디바이스 행은 지우지 않습니다. 실패한 실행은 다음 주기에 다시 시도되며
//! 수집 경로에는 영향을 주지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lanwatch_core::metrics as m;
use lanwatch_core::settings::CycleSettings;
use lanwatch_store::{MonthPartition, StreamKind, TelemetryStore};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::InventoryError;
use crate::task::TaskLock;

/// 한 번의 보존 작업 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// 새로 생성된 파티션 수
    pub partitions_created: usize,
    /// 생성에 실패한 파티션 수
    pub partition_failures: usize,
    /// 통째로 삭제된 파티션 수
    pub partitions_dropped: usize,
    /// 행 단위로 삭제된 스냅샷 수
    pub snapshot_rows_deleted: u64,
    /// 행 단위로 삭제된 syslog 이벤트 수
    pub syslog_rows_deleted: u64,
    /// 삭제된 상관 링크 수
    pub links_deleted: u64,
}

/// 누적 보존 작업 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionStats {
    pub runs: u64,
    pub failures: u64,
    pub partitions_dropped_total: u64,
    pub rows_deleted_total: u64,
    pub partition_failures_total: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    /// 마지막 실행의 에러 (성공하면 지워짐)
    pub last_error: Option<String>,
    /// 마지막 파티션 보장 에러 (성공하면 지워짐)
    pub last_partition_error: Option<String>,
}

/// 보존 기간 관리자
pub struct RetentionManager<S: TelemetryStore> {
    store: Arc<S>,
    lock: TaskLock,
    stats: Mutex<RetentionStats>,
}

impl<S: TelemetryStore> RetentionManager<S> {
    /// 새 관리자를 생성합니다.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lock: TaskLock::new("retention"),
            stats: Mutex::new(RetentionStats::default()),
        }
    }

    /// 누적 통계 스냅샷
    pub fn stats(&self) -> RetentionStats {
        self.stats.lock().clone()
    }

    /// 보존 작업을 한 번 실행합니다.
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        settings: &CycleSettings,
    ) -> Result<RetentionReport, InventoryError> {
        let _guard = self.lock.try_acquire()?;

        let mut report = RetentionReport::default();
        let partition_error = self.ensure_upcoming(now, &mut report).await;
        let result = self.prune(now, settings, &mut report).await;

        let mut stats = self.stats.lock();
        stats.runs += 1;
        stats.last_run_at = Some(now);
        stats.partition_failures_total += report.partition_failures as u64;
        stats.partitions_dropped_total += report.partitions_dropped as u64;
        stats.rows_deleted_total += report.snapshot_rows_deleted + report.syslog_rows_deleted;
        stats.last_partition_error = partition_error;

        match result {
            Ok(()) => {
                stats.last_error = None;
                info!(
                    dropped = report.partitions_dropped,
                    snapshot_rows = report.snapshot_rows_deleted,
                    syslog_rows = report.syslog_rows_deleted,
                    links = report.links_deleted,
                    "retention run done"
                );
                Ok(report)
            }
            Err(e) => {
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
                metrics::counter!(m::RETENTION_RUN_FAILURES_TOTAL).increment(1);
                error!(error = %e, "retention run failed, will retry next cycle");
                Err(e)
            }
        }
    }

    /// 이번 달/다음 달 파티션을 보장합니다. 마지막 실패 메시지를 반환합니다.
    async fn ensure_upcoming(
        &self,
        now: DateTime<Utc>,
        report: &mut RetentionReport,
    ) -> Option<String> {
        let current = MonthPartition::containing(now);
        let mut last_error = None;

        for kind in StreamKind::ALL {
            for partition in [current, current.next()] {
                match self.store.ensure_partition(kind, partition).await {
                    Ok(true) => {
                        report.partitions_created += 1;
                        info!(stream = kind.as_str(), partition = %partition, "partition created");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(
                            stream = kind.as_str(),
                            partition = %partition,
                            error = %e,
                            "failed to ensure partition"
                        );
                        metrics::counter!(m::STORE_PARTITION_FAILURES_TOTAL, m::LABEL_STREAM => kind.as_str())
                            .increment(1);
                        report.partition_failures += 1;
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        last_error
    }

    async fn prune(
        &self,
        now: DateTime<Utc>,
        settings: &CycleSettings,
        report: &mut RetentionReport,
    ) -> Result<(), InventoryError> {
        let snapshot_cutoff = now - settings.snapshot_retention();
        let syslog_cutoff = now - settings.syslog_retention();

        let (dropped, rows) = self
            .prune_stream(StreamKind::DeviceSnapshot, snapshot_cutoff)
            .await?;
        report.partitions_dropped += dropped;
        report.snapshot_rows_deleted = rows;

        let (dropped, rows) = self.prune_stream(StreamKind::SyslogEvent, syslog_cutoff).await?;
        report.partitions_dropped += dropped;
        report.syslog_rows_deleted = rows;

        report.links_deleted = self.store.delete_links_before(syslog_cutoff).await?;
        Ok(())
    }

    /// 한 스트림의 오래된 데이터를 지웁니다. (삭제한 파티션 수, 행 단위 삭제 수)
    async fn prune_stream(
        &self,
        kind: StreamKind,
        cutoff: DateTime<Utc>,
    ) -> Result<(usize, u64), InventoryError> {
        let mut dropped = 0;
        let mut rows = 0;

        for partition in self.store.list_partitions(kind).await? {
            if partition.is_entirely_before(cutoff) {
                if self.store.drop_partition(kind, partition).await? {
                    dropped += 1;
                    metrics::counter!(m::RETENTION_PARTITIONS_DROPPED_TOTAL, m::LABEL_STREAM => kind.as_str())
                        .increment(1);
                    info!(stream = kind.as_str(), partition = %partition, "expired partition dropped");
                }
            } else if partition.start() < cutoff {
                let deleted = self.store.prune_partition(kind, partition, cutoff).await?;
                rows += deleted;
                metrics::counter!(m::RETENTION_ROWS_DELETED_TOTAL, m::LABEL_STREAM => kind.as_str())
                    .increment(deleted);
                debug!(stream = kind.as_str(), partition = %partition, deleted, "boundary partition pruned");
            }
        }

        Ok((dropped, rows))
    }
}
