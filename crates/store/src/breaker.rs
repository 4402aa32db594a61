//! 서킷 브레이커
//!
//! 커넥션 풀에 하나만 존재하며 모든 컴포넌트가 공유합니다.
//! 연속된 일시적 실패가 임계값에 도달하면 열리고, 냉각 시간 이후
//! 시험 호출 하나를 허용(half-open)하여 결과에 따라 닫히거나 다시 열립니다.

use std::time::Duration;

use lanwatch_core::types::BreakerState;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::StoreError;

#[derive(Debug)]
struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// 공유 서킷 브레이커
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// 임계값과 냉각 시간으로 생성합니다.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// 호출 허용 여부를 확인합니다.
    pub fn check(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(opened_at) = inner.opened_at else {
            return Ok(());
        };
        if opened_at.elapsed() < self.cooldown || inner.trial_in_flight {
            return Err(StoreError::CircuitOpen);
        }
        inner.trial_in_flight = true;
        Ok(())
    }

    /// 저장소가 응답한 호출을 기록합니다 (성공 또는 영구 에러).
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.opened_at.is_some() {
            info!("storage circuit breaker closed");
            metrics::gauge!(lanwatch_core::metrics::STORE_BREAKER_OPEN).set(0.0);
        }
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    /// 일시적 실패를 기록합니다.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let reopen = inner.trial_in_flight;
        inner.trial_in_flight = false;
        if reopen || (inner.opened_at.is_none() && inner.consecutive_failures >= self.threshold) {
            inner.opened_at = Some(Instant::now());
            warn!(
                consecutive_failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "storage circuit breaker opened"
            );
            metrics::gauge!(lanwatch_core::metrics::STORE_BREAKER_OPEN).set(1.0);
        }
    }

    /// 현재 상태
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock();
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(_) if inner.trial_in_flight => BreakerState::HalfOpen,
            Some(opened_at) if opened_at.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }
}
