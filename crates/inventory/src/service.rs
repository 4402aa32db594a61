//! 인벤토리 서비스 -- 스냅샷 기록, 활동 스윕, 상관 분석, 보존 작업의 생명주기를 관리합니다.
//!
//! [`InventoryService`]는 core의 [`Pipeline`] trait을 구현하여
//! `lanwatch-daemon`에서 syslog 파이프라인과 같은 방식으로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! SnapshotFeed --mpsc--> feed loop -> SnapshotRecorder --+
//! sweep timer        -> ActivitySweeper ------------------+
//! correlation timer  -> Correlator -----------------------+--> TelemetryStore
//! retention timer    -> RetentionManager -----------------+
//! ```
//!
//! 각 작업은 독립된 태스크이며 작업 종류별 실행 락만 가집니다.
//! 매 사이클 시작 시 [`SettingsHandle`]에서 설정 복사본을 읽습니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lanwatch_core::error::{LanwatchError, PipelineError};
use lanwatch_core::pipeline::{HealthStatus, IngestHealthSource, Pipeline};
use lanwatch_core::settings::SettingsHandle;
use lanwatch_core::types::{BreakerState, SnapshotRecord};
use lanwatch_store::TelemetryStore;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activity::{ActivitySweeper, SweepReport};
use crate::config::EngineConfig;
use crate::correlator::{CorrelationReport, Correlator, CorrelatorStats};
use crate::error::InventoryError;
use crate::feed::SnapshotFeed;
use crate::query::QueryService;
use crate::recorder::{RecordReport, RecorderStats, SnapshotRecorder};
use crate::retention::{RetentionManager, RetentionReport, RetentionStats};
use crate::task::spawn_periodic;

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 작업별 누적 통계 묶음
#[derive(Debug, Clone, Serialize)]
pub struct InventoryStats {
    pub recorder: RecorderStats,
    pub correlator: CorrelatorStats,
    pub retention: RetentionStats,
    pub last_sweep: Option<DateTime<Utc>>,
}

/// 디바이스 인벤토리 서비스
///
/// # 사용 예시
/// ```ignore
/// use lanwatch_inventory::InventoryServiceBuilder;
///
/// let mut service = InventoryServiceBuilder::new()
///     .config(config)
///     .store(store)
///     .settings(settings)
///     .build()?;
///
/// let feed = service.feed();
/// service.start().await?;
/// feed.submit(records).await?;
/// ```
pub struct InventoryService<S: TelemetryStore> {
    config: EngineConfig,
    state: ServiceState,
    store: Arc<S>,
    settings: SettingsHandle,
    recorder: Arc<SnapshotRecorder<S>>,
    sweeper: Arc<ActivitySweeper<S>>,
    correlator: Arc<Correlator<S>>,
    retention: Arc<RetentionManager<S>>,
    query: QueryService<S>,
    feed: SnapshotFeed,
    feed_rx: Option<mpsc::Receiver<Vec<SnapshotRecord>>>,
    feed_task: Option<JoinHandle<mpsc::Receiver<Vec<SnapshotRecord>>>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: TelemetryStore> InventoryService<S> {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// 엔진 설정
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 사이클 설정 핸들 (운영자 변경은 다음 사이클부터 반영)
    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// 스냅샷 피드 송신 핸들
    pub fn feed(&self) -> SnapshotFeed {
        self.feed.clone()
    }

    /// 조회 서비스
    pub fn query(&self) -> QueryService<S> {
        self.query.clone()
    }

    /// 작업별 누적 통계
    pub fn stats(&self) -> InventoryStats {
        InventoryStats {
            recorder: self.recorder.stats(),
            correlator: self.correlator.stats(),
            retention: self.retention.stats(),
            last_sweep: self.sweeper.last_sweep(),
        }
    }

    /// 피드를 거치지 않고 한 사이클을 바로 기록합니다.
    pub async fn record_cycle(
        &self,
        records: Vec<SnapshotRecord>,
    ) -> Result<RecordReport, InventoryError> {
        self.recorder.record_cycle(records).await
    }

    /// 활동 상태 스윕을 즉시 실행합니다.
    pub async fn sweep_now(&self) -> Result<SweepReport, InventoryError> {
        self.sweeper.sweep(Utc::now(), &self.settings.current()).await
    }

    /// 상관 분석을 즉시 실행합니다.
    pub async fn correlate_now(&self) -> Result<CorrelationReport, InventoryError> {
        self.correlator.run_once().await
    }

    /// 수신 시각 구간을 다시 상관 분석합니다.
    pub async fn rescan(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CorrelationReport, InventoryError> {
        self.correlator.rescan(from, to).await
    }

    /// 보존 작업을 즉시 실행합니다.
    pub async fn run_retention(&self) -> Result<RetentionReport, InventoryError> {
        self.retention.run_once(Utc::now(), &self.settings.current()).await
    }

    fn spawn_tasks(&mut self, rx: mpsc::Receiver<Vec<SnapshotRecord>>) {
        let cancel = self.cancel.clone();

        let recorder = Arc::clone(&self.recorder);
        self.feed_task = Some(tokio::spawn(feed_loop(
            recorder,
            rx,
            cancel.clone(),
            self.config.shutdown_grace(),
        )));

        let sweeper = Arc::clone(&self.sweeper);
        let settings = self.settings.clone();
        self.tasks.push(spawn_periodic(
            "activity_sweep",
            self.config.sweep_interval(),
            cancel.clone(),
            move || {
                let sweeper = Arc::clone(&sweeper);
                let settings = settings.current();
                async move {
                    match sweeper.sweep(Utc::now(), &settings).await {
                        Ok(_) => {}
                        Err(InventoryError::TaskBusy { .. }) => debug!("activity sweep still running"),
                        Err(e) => warn!(error = %e, "activity sweep failed"),
                    }
                }
            },
        ));

        let correlator = Arc::clone(&self.correlator);
        let settings = self.settings.clone();
        self.tasks.push(spawn_periodic(
            "correlation",
            self.config.correlation_interval(),
            cancel.clone(),
            move || {
                let correlator = Arc::clone(&correlator);
                let enabled = settings.current().correlation_enabled;
                async move {
                    if !enabled {
                        debug!("correlation disabled, skipping cycle");
                        return;
                    }
                    match correlator.run_once().await {
                        Ok(_) => {}
                        Err(InventoryError::TaskBusy { .. }) => debug!("correlation still running"),
                        Err(e) => warn!(error = %e, "correlation pass failed"),
                    }
                }
            },
        ));

        let retention = Arc::clone(&self.retention);
        let settings = self.settings.clone();
        self.tasks.push(spawn_periodic(
            "retention",
            self.config.retention_interval(),
            cancel,
            move || {
                let retention = Arc::clone(&retention);
                let settings = settings.current();
                async move {
                    // 실패는 run_once 안에서 기록/로그됨
                    let _ = retention.run_once(Utc::now(), &settings).await;
                }
            },
        ));
    }
}

/// 피드에서 사이클을 받아 기록합니다. 종료 시 다음 시작을 위해 수신 측을 돌려줍니다.
///
/// 취소된 뒤에도 이미 큐에 들어온 사이클은 `grace` 안에서 기록을 시도합니다.
async fn feed_loop<S: TelemetryStore>(
    recorder: Arc<SnapshotRecorder<S>>,
    mut rx: mpsc::Receiver<Vec<SnapshotRecord>>,
    cancel: CancellationToken,
    grace: Duration,
) -> mpsc::Receiver<Vec<SnapshotRecord>> {
    info!("snapshot feed loop started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            cycle = rx.recv() => {
                let Some(records) = cycle else {
                    break;
                };
                if let Err(e) = recorder.record_cycle(records).await {
                    warn!(error = %e, "snapshot cycle not recorded");
                }
            }
        }
    }
    drain_feed(&recorder, &mut rx, grace).await;
    info!("snapshot feed loop stopped");
    rx
}

/// 큐에 남은 사이클을 제한 시간 안에서 기록하고, 남은 것은 버린 뒤 버린 개수를 반환합니다.
async fn drain_feed<S: TelemetryStore>(
    recorder: &SnapshotRecorder<S>,
    rx: &mut mpsc::Receiver<Vec<SnapshotRecord>>,
    grace: Duration,
) -> u64 {
    let mut drained = 0u64;
    let completed = tokio::time::timeout(grace, async {
        while let Ok(records) = rx.try_recv() {
            if let Err(e) = recorder.record_cycle(records).await {
                warn!(error = %e, "queued snapshot cycle not recorded");
            }
            drained += 1;
        }
    })
    .await
    .is_ok();

    let mut dropped = 0u64;
    if !completed {
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
    }

    if dropped > 0 {
        metrics::counter!(lanwatch_core::metrics::INVENTORY_FEED_CYCLES_DROPPED_TOTAL)
            .increment(dropped);
        warn!(
            drained,
            dropped,
            grace_secs = grace.as_secs(),
            "snapshot feed not fully drained before shutdown"
        );
    } else if drained > 0 {
        info!(drained, "queued snapshot cycles recorded before shutdown");
    }
    dropped
}

impl<S: TelemetryStore> Pipeline for InventoryService<S> {
    async fn start(&mut self) -> Result<(), LanwatchError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let rx = self.feed_rx.take().ok_or_else(|| {
            PipelineError::InitFailed("snapshot feed receiver unavailable".to_owned())
        })?;

        info!(
            sweep_interval_secs = self.config.sweep_interval_secs,
            correlation_interval_secs = self.config.correlation_interval_secs,
            retention_interval_secs = self.config.retention_interval_secs,
            "starting inventory service"
        );

        self.cancel = CancellationToken::new();
        self.spawn_tasks(rx);

        self.state = ServiceState::Running;
        info!("inventory service started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LanwatchError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping inventory service");

        // 진행 중인 사이클은 끝까지 실행된 뒤 태스크가 종료됨
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "inventory task ended abnormally");
            }
        }
        if let Some(feed_task) = self.feed_task.take() {
            match feed_task.await {
                Ok(rx) => self.feed_rx = Some(rx),
                Err(e) => error!(error = %e, "snapshot feed loop ended abnormally"),
            }
        }

        self.state = ServiceState::Stopped;
        info!("inventory service stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let recorder = self.recorder.stats();
                let retention = self.retention.stats();
                if let Some(e) = recorder
                    .last_partition_error
                    .or(retention.last_partition_error)
                {
                    HealthStatus::Degraded(format!("partition creation failing: {e}"))
                } else if self.store.breaker_state() == BreakerState::Open {
                    HealthStatus::Degraded("storage circuit breaker open".to_owned())
                } else if let Some(e) = retention.last_error {
                    HealthStatus::Degraded(format!("retention failing: {e}"))
                } else {
                    HealthStatus::Healthy
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

// ─── 빌더 ─────────────────────────────────────────────────────────

/// 인벤토리 서비스 빌더
pub struct InventoryServiceBuilder<S> {
    config: EngineConfig,
    store: Option<Arc<S>>,
    settings: Option<SettingsHandle>,
    ingest: Option<Arc<dyn IngestHealthSource>>,
}

impl<S: TelemetryStore> InventoryServiceBuilder<S> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            settings: None,
            ingest: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 저장소를 지정합니다.
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 사이클 설정 핸들을 지정합니다. 생략하면 기본값으로 시작합니다.
    pub fn settings(mut self, settings: SettingsHandle) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 조회 서비스가 노출할 syslog 수집 상태 제공자를 지정합니다.
    pub fn ingest_source(mut self, source: Arc<dyn IngestHealthSource>) -> Self {
        self.ingest = Some(source);
        self
    }

    /// 서비스를 빌드합니다.
    pub fn build(self) -> Result<InventoryService<S>, InventoryError> {
        self.config.validate()?;
        let store = self.store.ok_or_else(|| InventoryError::Config {
            field: "store".to_owned(),
            reason: "a telemetry store is required".to_owned(),
        })?;

        let correlator = Correlator::new(
            Arc::clone(&store),
            self.config.confidences,
            self.config.correlation_batch_size,
        )?;

        let mut query = QueryService::new(Arc::clone(&store));
        if let Some(source) = self.ingest {
            query = query.with_ingest_source(source);
        }

        let (feed, feed_rx) = SnapshotFeed::channel(self.config.feed_capacity);

        Ok(InventoryService {
            recorder: Arc::new(SnapshotRecorder::new(Arc::clone(&store))),
            sweeper: Arc::new(ActivitySweeper::new(Arc::clone(&store))),
            correlator: Arc::new(correlator),
            retention: Arc::new(RetentionManager::new(Arc::clone(&store))),
            query,
            feed,
            feed_rx: Some(feed_rx),
            feed_task: None,
            settings: self.settings.unwrap_or_default(),
            store,
            config: self.config,
            state: ServiceState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl<S: TelemetryStore> Default for InventoryServiceBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
