//! 배치 기록기 -- 백로그에서 꺼낸 이벤트를 파티션 저장소에 기록합니다.
//!
//! [`BatchWriter::flush`]의 처리 순서:
//! 1. 배치가 닿는 월마다 파티션을 보장 (이미 확인한 월은 캐시)
//! 2. 배치 전체를 한 트랜잭션으로 insert (워터마크도 같은 트랜잭션에서 갱신)
//! 3. 일시적 실패 → 배치 전체를 되돌려 보관, 다음 플러시는 백오프 후
//! 4. 영구 실패 → 행 단위로 다시 insert 하여 문제 행만 격리/집계

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::slice;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lanwatch_core::metrics as m;
use lanwatch_core::types::{BreakerState, SyslogEvent, WatermarkStream};
use lanwatch_store::{MonthPartition, RetryPolicy, StoreError, StreamKind, TelemetryStore};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

/// syslog 이벤트를 받아 기록하는 저장소 측 인터페이스
///
/// 모든 [`TelemetryStore`]가 자동으로 구현합니다.
pub trait SyslogSink: Send + Sync + 'static {
    /// 월 파티션을 보장합니다.
    fn ensure_partition(
        &self,
        partition: MonthPartition,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// 배치를 한 트랜잭션으로 기록하고 새로 기록된 행 수를 반환합니다.
    fn insert_batch(
        &self,
        events: &[SyslogEvent],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// 커밋된 최대 수집 순번
    fn committed_watermark(&self) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    /// 저장소 서킷 브레이커 상태
    fn breaker_state(&self) -> BreakerState;
}

impl<T: TelemetryStore> SyslogSink for T {
    fn ensure_partition(
        &self,
        partition: MonthPartition,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        TelemetryStore::ensure_partition(self, StreamKind::SyslogEvent, partition)
    }

    fn insert_batch(
        &self,
        events: &[SyslogEvent],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        self.insert_syslog_batch(events)
    }

    fn committed_watermark(&self) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send {
        async move {
            let position = self.read_watermark(WatermarkStream::Syslog).await?;
            Ok(position.and_then(|p| u64::try_from(p).ok()))
        }
    }

    fn breaker_state(&self) -> BreakerState {
        TelemetryStore::breaker_state(self)
    }
}

/// 플러시 누적 통계
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushStats {
    /// 기록된 이벤트 수
    pub written_total: u64,
    /// 행 단위 격리로 거부된 이벤트 수
    pub rejected_total: u64,
    /// 실패한 플러시 수
    pub failures_total: u64,
    /// 연속 실패 횟수 (성공 시 0)
    pub consecutive_failures: u32,
    /// 파티션 생성 실패 횟수
    pub partition_failures: u64,
    /// 커밋된 최대 순번
    pub watermark: Option<u64>,
    /// 마지막 성공 플러시 시각
    pub last_flush_at: Option<DateTime<Utc>>,
    /// 마지막 실패 사유 (성공 시 해제)
    pub last_error: Option<String>,
}

/// 한 번의 플러시 결과
#[derive(Debug, Default)]
pub struct FlushReport {
    /// 새로 기록된 행 수
    pub written: u64,
    /// 거부된 행 수
    pub rejected: u64,
    /// 기록하지 못해 다시 보관해야 하는 이벤트 (순서 유지)
    pub retained: Vec<SyslogEvent>,
    /// 실패 원인
    pub error: Option<StoreError>,
}

impl FlushReport {
    /// 실패 없이 끝났는지 확인합니다.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn retain(batch: Vec<SyslogEvent>, written: u64, rejected: u64, error: StoreError) -> Self {
        Self {
            written,
            rejected,
            retained: batch,
            error: Some(error),
        }
    }
}

/// 배치 기록기
pub struct BatchWriter<S> {
    sink: Arc<S>,
    retry: RetryPolicy,
    ensured: HashSet<MonthPartition>,
    stats: Arc<Mutex<FlushStats>>,
}

impl<S: SyslogSink> BatchWriter<S> {
    /// 새 기록기를 생성합니다. `retry`는 실패한 플러시 사이의 백오프에 사용됩니다.
    pub fn new(sink: Arc<S>, retry: RetryPolicy) -> Self {
        Self::with_stats(sink, retry, Arc::new(Mutex::new(FlushStats::default())))
    }

    /// 외부에서 공유하는 통계 핸들로 기록기를 생성합니다.
    ///
    /// 재시작 후에도 같은 핸들이 누적 통계를 이어받습니다.
    pub fn with_stats(sink: Arc<S>, retry: RetryPolicy, stats: Arc<Mutex<FlushStats>>) -> Self {
        Self {
            sink,
            retry,
            ensured: HashSet::new(),
            stats,
        }
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> FlushStats {
        self.stats.lock().clone()
    }

    /// 연속 실패 뒤 다음 플러시까지 기다릴 시간. 실패가 없으면 `None`.
    pub fn backoff(&self) -> Option<Duration> {
        let failures = self.stats.lock().consecutive_failures;
        (failures > 0).then(|| self.retry.delay_for(failures))
    }

    /// 배치를 기록합니다.
    pub async fn flush(&mut self, batch: Vec<SyslogEvent>) -> FlushReport {
        if batch.is_empty() {
            return FlushReport::default();
        }
        let started = Instant::now();
        let report = self.flush_inner(batch).await;
        metrics::histogram!(m::SYSLOG_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        self.record(&report);
        report
    }

    async fn flush_inner(&mut self, batch: Vec<SyslogEvent>) -> FlushReport {
        if let Err(e) = self.ensure_partitions(&batch).await {
            return FlushReport::retain(batch, 0, 0, e);
        }

        let err = match self.sink.insert_batch(&batch).await {
            Ok(written) => {
                debug!(count = batch.len(), written, "syslog batch flushed");
                return FlushReport {
                    written,
                    ..FlushReport::default()
                };
            }
            Err(e) => e,
        };

        if err.is_transient() {
            warn!(count = batch.len(), error = %err, "transient flush failure, batch retained");
            return FlushReport::retain(batch, 0, 0, err);
        }
        if matches!(err, StoreError::PartitionMissing { .. }) {
            // 다른 경로에서 파티션이 지워졌으면 다음 플러시에서 다시 보장
            self.ensured.clear();
            warn!(error = %err, "partition vanished, batch retained");
            return FlushReport::retain(batch, 0, 0, err);
        }

        warn!(
            count = batch.len(),
            error = %err,
            "batch insert failed permanently, isolating rows"
        );
        self.insert_row_by_row(batch).await
    }

    async fn ensure_partitions(&mut self, batch: &[SyslogEvent]) -> Result<(), StoreError> {
        let months: BTreeSet<MonthPartition> = batch
            .iter()
            .map(|e| MonthPartition::containing(e.received_at))
            .collect();

        for partition in months {
            if self.ensured.contains(&partition) {
                continue;
            }
            match self.sink.ensure_partition(partition).await {
                Ok(_) => {
                    self.ensured.insert(partition);
                }
                Err(e) => {
                    self.stats.lock().partition_failures += 1;
                    metrics::counter!(m::STORE_PARTITION_FAILURES_TOTAL, m::LABEL_STREAM => "syslog")
                        .increment(1);
                    error!(partition = %partition, error = %e, "failed to ensure syslog partition");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn insert_row_by_row(&mut self, batch: Vec<SyslogEvent>) -> FlushReport {
        let mut written = 0u64;
        let mut rejected = 0u64;

        for (idx, event) in batch.iter().enumerate() {
            match self.sink.insert_batch(slice::from_ref(event)).await {
                Ok(n) => written += n,
                Err(e) if e.is_transient() => {
                    warn!(
                        remaining = batch.len() - idx,
                        error = %e,
                        "transient failure during row isolation, retaining remainder"
                    );
                    let remainder = batch[idx..].to_vec();
                    return FlushReport::retain(remainder, written, rejected, e);
                }
                Err(e) => {
                    rejected += 1;
                    metrics::counter!(m::SYSLOG_ROWS_REJECTED_TOTAL).increment(1);
                    warn!(seq = event.seq, source = %event.source, error = %e, "syslog row rejected");
                }
            }
        }

        FlushReport {
            written,
            rejected,
            ..FlushReport::default()
        }
    }

    fn record(&self, report: &FlushReport) {
        let mut stats = self.stats.lock();
        stats.written_total += report.written;
        stats.rejected_total += report.rejected;
        if report.written > 0 {
            metrics::counter!(m::SYSLOG_EVENTS_WRITTEN_TOTAL).increment(report.written);
        }

        match &report.error {
            None => {
                stats.consecutive_failures = 0;
                stats.last_flush_at = Some(Utc::now());
                stats.last_error = None;
            }
            Some(e) => {
                stats.failures_total += 1;
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                stats.last_error = Some(e.to_string());
                metrics::counter!(m::SYSLOG_FLUSH_FAILURES_TOTAL).increment(1);
            }
        }
    }

    /// 저장소에서 워터마크를 읽어 통계에 반영합니다.
    pub async fn refresh_watermark(&self) -> Result<Option<u64>, StoreError> {
        let watermark = self.sink.committed_watermark().await?;
        if let Some(w) = watermark {
            metrics::gauge!(m::SYSLOG_WATERMARK).set(w as f64);
        }
        self.stats.lock().watermark = watermark;
        Ok(watermark)
    }

    /// 저장소 브레이커 상태
    pub fn breaker_state(&self) -> BreakerState {
        self.sink.breaker_state()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::VecDeque;

    use chrono::TimeZone;

    /// 실패를 주입할 수 있는 메모리 sink
    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub rows: Mutex<Vec<SyslogEvent>>,
        pub partitions: Mutex<BTreeSet<MonthPartition>>,
        pub ensure_calls: Mutex<u32>,
        /// 배치 insert 호출마다 하나씩 꺼내 적용하는 실패 목록
        pub batch_failures: Mutex<VecDeque<StoreError>>,
        /// 이 순번을 포함한 insert는 영구 실패
        pub poison_seq: Mutex<Option<u64>>,
        pub fail_partitions: Mutex<bool>,
    }

    impl SyslogSink for MemorySink {
        async fn ensure_partition(&self, partition: MonthPartition) -> Result<bool, StoreError> {
            *self.ensure_calls.lock() += 1;
            if *self.fail_partitions.lock() {
                return Err(StoreError::Query("disk full".to_owned()));
            }
            Ok(self.partitions.lock().insert(partition))
        }

        async fn insert_batch(&self, events: &[SyslogEvent]) -> Result<u64, StoreError> {
            if let Some(e) = self.batch_failures.lock().pop_front() {
                return Err(e);
            }
            let poison = *self.poison_seq.lock();
            if let Some(p) = poison
                && events.iter().any(|e| e.seq == p)
            {
                return Err(StoreError::Constraint(format!("row {p} rejected")));
            }
            let partitions = self.partitions.lock();
            for e in events {
                let p = MonthPartition::containing(e.received_at);
                if !partitions.contains(&p) {
                    return Err(StoreError::PartitionMissing {
                        table: StreamKind::SyslogEvent.table_name(p),
                    });
                }
            }
            self.rows.lock().extend_from_slice(events);
            Ok(events.len() as u64)
        }

        async fn committed_watermark(&self) -> Result<Option<u64>, StoreError> {
            Ok(self.rows.lock().iter().map(|e| e.seq).max())
        }

        fn breaker_state(&self) -> BreakerState {
            BreakerState::Closed
        }
    }

    pub(crate) fn event_at(seq: u64, received_at: DateTime<Utc>) -> SyslogEvent {
        SyslogEvent {
            seq,
            received_at,
            event_time: received_at,
            host: Some("gw".to_owned()),
            facility: Some(16),
            severity: Some(6),
            tag: Some("app".to_owned()),
            message: format!("m{seq}"),
            source: "10.0.0.1:514".to_owned(),
            raw: format!("<134>m{seq}"),
            truncated: false,
        }
    }

    fn may(seq: u64) -> SyslogEvent {
        event_at(seq, Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap())
    }

    fn june(seq: u64) -> SyslogEvent {
        event_at(seq, Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap())
    }

    fn writer(sink: &Arc<MemorySink>) -> BatchWriter<MemorySink> {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        };
        BatchWriter::new(Arc::clone(sink), retry)
    }

    #[tokio::test]
    async fn flush_ensures_each_touched_month_once() {
        let sink = Arc::new(MemorySink::default());
        let mut writer = writer(&sink);

        let report = writer.flush(vec![may(1), june(2), june(3)]).await;
        assert!(report.is_success());
        assert_eq!(report.written, 3);
        assert_eq!(sink.partitions.lock().len(), 2);

        writer.flush(vec![june(4)]).await;
        assert_eq!(*sink.ensure_calls.lock(), 2);
        assert_eq!(writer.refresh_watermark().await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn transient_failure_retains_batch_and_backs_off() {
        let sink = Arc::new(MemorySink::default());
        sink.batch_failures
            .lock()
            .push_back(StoreError::Busy("locked".to_owned()));
        let mut writer = writer(&sink);

        let report = writer.flush(vec![june(1), june(2)]).await;
        assert!(!report.is_success());
        assert_eq!(
            report.retained.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(writer.backoff(), Some(Duration::from_millis(100)));
        assert!(sink.rows.lock().is_empty());

        let stats = writer.stats();
        assert_eq!(stats.consecutive_failures, 1);
        assert!(stats.last_error.is_some());

        // 재시도 성공 시 연속 실패가 초기화됨
        let report = writer.flush(report.retained).await;
        assert!(report.is_success());
        assert_eq!(writer.backoff(), None);
        assert_eq!(writer.stats().last_error, None);
    }

    #[tokio::test]
    async fn permanent_failure_isolates_offending_row() {
        let sink = Arc::new(MemorySink::default());
        *sink.poison_seq.lock() = Some(2);
        let mut writer = writer(&sink);

        let report = writer.flush(vec![june(1), june(2), june(3)]).await;
        assert!(report.is_success());
        assert_eq!(report.written, 2);
        assert_eq!(report.rejected, 1);
        assert!(report.retained.is_empty());
        assert_eq!(
            sink.rows.lock().iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(writer.stats().rejected_total, 1);
    }

    #[tokio::test]
    async fn transient_failure_during_isolation_retains_remainder() {
        let sink = Arc::new(MemorySink::default());
        {
            let mut failures = sink.batch_failures.lock();
            failures.push_back(StoreError::Constraint("bad batch".to_owned()));
            failures.push_back(StoreError::Timeout {
                operation: "insert".to_owned(),
                timeout_ms: 10,
            });
        }
        let mut writer = writer(&sink);

        let report = writer.flush(vec![june(1), june(2)]).await;
        assert!(!report.is_success());
        assert_eq!(
            report.retained.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn partition_failure_is_counted_and_retains_batch() {
        let sink = Arc::new(MemorySink::default());
        *sink.fail_partitions.lock() = true;
        let mut writer = writer(&sink);

        let report = writer.flush(vec![june(1)]).await;
        assert_eq!(report.retained.len(), 1);
        assert_eq!(writer.stats().partition_failures, 1);

        *sink.fail_partitions.lock() = false;
        assert!(writer.flush(report.retained).await.is_success());
    }

    #[tokio::test]
    async fn vanished_partition_is_ensured_again() {
        let sink = Arc::new(MemorySink::default());
        let mut writer = writer(&sink);
        assert!(writer.flush(vec![june(1)]).await.is_success());

        sink.partitions.lock().clear();
        let report = writer.flush(vec![june(2)]).await;
        assert!(matches!(report.error, Some(StoreError::PartitionMissing { .. })));

        assert!(writer.flush(report.retained).await.is_success());
        assert_eq!(sink.rows.lock().len(), 2);
    }
}
