//! 파이프라인 오케스트레이션 -- 수신/파싱/배치 기록의 전체 흐름을 관리합니다.
//!
//! [`SyslogPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `lanwatch-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! UDP socket -> SyslogUdpCollector -> parse -> IngestQueue (backlog)
//!                                                   |
//!                         flush task (batch_size / flush_interval)
//!                                                   v
//!                                   BatchWriter -> partitioned store
//! ```
//!
//! 수신 루프는 저장소를 기다리지 않습니다. 저장소가 느리거나 멈추면
//! 백로그가 쌓이고, 용량을 넘으면 가장 오래된 이벤트부터 버려집니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lanwatch_core::error::{LanwatchError, PipelineError};
use lanwatch_core::pipeline::{HealthStatus, IngestHealthSource, Pipeline};
use lanwatch_core::types::{BreakerState, IngestHealth};
use lanwatch_store::RetryPolicy;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::SyslogUdpCollector;
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::queue::IngestQueue;
use crate::writer::{BatchWriter, FlushStats, SyslogSink};

/// 백로그 사용률 경고 임계값
const BACKLOG_DEGRADED_RATIO: f64 = 0.9;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// syslog 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use lanwatch_log_pipeline::SyslogPipelineBuilder;
///
/// let mut pipeline = SyslogPipelineBuilder::new()
///     .config(config)
///     .sink(store)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct SyslogPipeline<S: SyslogSink> {
    config: PipelineConfig,
    state: PipelineState,
    sink: Arc<S>,
    retry: RetryPolicy,
    queue: Arc<IngestQueue>,
    flush_stats: Arc<Mutex<FlushStats>>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: SyslogSink> SyslogPipeline<S> {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 실행 중일 때 실제로 바인드된 주소
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 파이프라인 설정
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 백로그 사용률 (0.0~1.0)
    pub fn backlog_utilization(&self) -> f64 {
        self.queue.utilization()
    }

    /// 수집 경로 상태 요약
    pub fn ingest_health(&self) -> IngestHealth {
        self.monitor().ingest_health()
    }

    /// 파이프라인 소유권 없이 수집 상태를 읽는 핸들
    pub fn monitor(&self) -> IngestMonitor<S> {
        IngestMonitor {
            queue: Arc::clone(&self.queue),
            flush_stats: Arc::clone(&self.flush_stats),
            sink: Arc::clone(&self.sink),
        }
    }
}

// ─── 상태 핸들 ─────────────────────────────────────────────────────

/// 수집 큐와 플러시 통계를 공유하는 읽기 전용 핸들
pub struct IngestMonitor<S: SyslogSink> {
    queue: Arc<IngestQueue>,
    flush_stats: Arc<Mutex<FlushStats>>,
    sink: Arc<S>,
}

impl<S: SyslogSink> Clone for IngestMonitor<S> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            flush_stats: Arc::clone(&self.flush_stats),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S: SyslogSink> IngestHealthSource for IngestMonitor<S> {
    fn ingest_health(&self) -> IngestHealth {
        let queue = self.queue.stats();
        let flush = self.flush_stats.lock().clone();
        IngestHealth {
            backlog_len: queue.backlog_len,
            backlog_capacity: queue.backlog_capacity,
            received_total: queue.received_total,
            dropped_total: queue.dropped_total,
            parse_errors_total: queue.parse_errors_total,
            truncated_total: queue.truncated_total,
            rejected_rows_total: flush.rejected_total,
            watermark: flush.watermark,
            last_flush_at: flush.last_flush_at,
            last_flush_error: flush.last_error,
            consecutive_failures: flush.consecutive_failures,
            partition_failures: flush.partition_failures,
            breaker: self.sink.breaker_state(),
        }
    }
}

impl<S: SyslogSink> Pipeline for SyslogPipeline<S> {
    async fn start(&mut self) -> Result<(), LanwatchError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(bind = %self.config.bind, "starting syslog pipeline");

        // 1. 소켓 바인드 (실패 시 시작 실패)
        let collector = SyslogUdpCollector::bind(&self.config, Arc::clone(&self.queue)).await?;
        let local_addr = collector.local_addr();

        // 2. 커밋된 워터마크 다음 순번부터 이어서 부여
        let writer = BatchWriter::with_stats(
            Arc::clone(&self.sink),
            self.retry.clone(),
            Arc::clone(&self.flush_stats),
        );
        let watermark = writer
            .refresh_watermark()
            .await
            .map_err(LogPipelineError::from)?;
        if let Some(w) = watermark {
            self.queue.resume_after(w);
        }
        info!(
            watermark = ?watermark,
            next_seq = self.queue.next_seq(),
            "syslog sequence resumed"
        );

        // 3. 수신/플러시 태스크 스폰
        self.cancel = CancellationToken::new();

        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            collector.run(cancel).await;
        }));

        let flush = FlushLoop {
            queue: Arc::clone(&self.queue),
            writer,
            flush_interval: self.config.flush_interval(),
            shutdown_grace: self.config.shutdown_grace(),
            cancel: self.cancel.clone(),
        };
        self.tasks.push(tokio::spawn(flush.run()));

        self.local_addr = Some(local_addr);
        self.state = PipelineState::Running;
        info!(addr = %local_addr, "syslog pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LanwatchError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping syslog pipeline");

        // 수신 중단 후 플러시 태스크가 유예 시간 안에 백로그를 비움
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "syslog pipeline task ended abnormally");
            }
        }

        self.local_addr = None;
        self.state = PipelineState::Stopped;
        info!("syslog pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let health = self.ingest_health();
                let utilization = self.queue.utilization();
                if utilization > BACKLOG_DEGRADED_RATIO {
                    HealthStatus::Degraded(format!(
                        "backlog utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else if health.breaker == BreakerState::Open {
                    HealthStatus::Degraded("storage circuit breaker open".to_owned())
                } else if health.is_degraded() {
                    HealthStatus::Degraded(format!(
                        "{} consecutive flush failures: {}",
                        health.consecutive_failures,
                        health.last_flush_error.as_deref().unwrap_or("unknown")
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

// ─── 플러시 태스크 ─────────────────────────────────────────────────

struct FlushLoop<S: SyslogSink> {
    queue: Arc<IngestQueue>,
    writer: BatchWriter<S>,
    flush_interval: Duration,
    shutdown_grace: Duration,
    cancel: CancellationToken,
}

impl<S: SyslogSink> FlushLoop<S> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            // 실패 중이면 백오프 후 바로 재시도, 아니면 배치/주기 대기
            if let Some(delay) = self.writer.backoff() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = self.queue.batch_ready() => {}
                }
            }
            self.flush_pending().await;
        }

        self.final_flush().await;
    }

    /// 백로그를 배치 단위로 비웁니다. 실패하면 남은 배치를 되돌리고 멈춥니다.
    async fn flush_pending(&mut self) {
        let batch_size = self.queue.batch_size();
        loop {
            let batch = self.queue.take_batch(batch_size);
            if batch.is_empty() {
                return;
            }
            let report = self.writer.flush(batch).await;
            if report.written > 0
                && let Err(e) = self.writer.refresh_watermark().await
            {
                debug!(error = %e, "failed to refresh syslog watermark");
            }
            let failed = !report.is_success();
            self.queue.requeue_front(report.retained);
            if failed {
                return;
            }
        }
    }

    async fn final_flush(&mut self) {
        let pending = self.queue.len();
        if pending == 0 {
            return;
        }
        info!(pending, grace_secs = self.shutdown_grace.as_secs(), "flushing syslog backlog before shutdown");

        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while !self.queue.is_empty() {
                self.flush_pending().await;
                if let Some(delay) = self.writer.backoff() {
                    tokio::time::sleep(delay).await;
                }
            }
        })
        .await;

        let remaining = self.queue.len();
        if drained.is_err() || remaining > 0 {
            warn!(remaining, "syslog backlog not fully flushed before shutdown");
        }
    }
}

// ─── 빌더 ─────────────────────────────────────────────────────────

/// syslog 파이프라인 빌더
pub struct SyslogPipelineBuilder<S> {
    config: PipelineConfig,
    sink: Option<Arc<S>>,
    retry: RetryPolicy,
}

impl<S: SyslogSink> SyslogPipelineBuilder<S> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            sink: None,
            retry: RetryPolicy::default(),
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 이벤트를 기록할 저장소를 지정합니다.
    pub fn sink(mut self, sink: Arc<S>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 실패한 플러시 사이의 백오프 정책을 지정합니다.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<SyslogPipeline<S>, LogPipelineError> {
        self.config.validate()?;
        let sink = self.sink.ok_or_else(|| LogPipelineError::Config {
            field: "sink".to_owned(),
            reason: "a storage sink is required".to_owned(),
        })?;

        let queue = Arc::new(IngestQueue::new(
            self.config.backlog_capacity,
            self.config.batch_size,
        ));

        Ok(SyslogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            sink,
            retry: self.retry,
            queue,
            flush_stats: Arc::new(Mutex::new(FlushStats::default())),
            local_addr: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl<S: SyslogSink> Default for SyslogPipelineBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
