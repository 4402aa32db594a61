//! 주기 작업 실행 도구
//!
//! 작업 종류마다 [`TaskLock`]을 하나씩 가지며, 같은 종류의 작업은 겹쳐 실행되지 않습니다.
//! 서로 다른 작업 사이에는 공유 락이 없습니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::InventoryError;

/// 작업 종류별 실행 락
#[derive(Debug, Clone)]
pub struct TaskLock {
    name: &'static str,
    inner: Arc<Mutex<()>>,
}

/// 실행 중인 작업이 쥐고 있는 락. drop되면 해제됩니다.
#[derive(Debug)]
pub struct TaskGuard {
    _guard: OwnedMutexGuard<()>,
}

impl TaskLock {
    /// 새 락을 생성합니다.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(())),
        }
    }

    /// 작업 이름
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 락을 즉시 획득합니다. 이미 실행 중이면 `TaskBusy`.
    pub fn try_acquire(&self) -> Result<TaskGuard, InventoryError> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map(|guard| TaskGuard { _guard: guard })
            .map_err(|_| InventoryError::TaskBusy { task: self.name })
    }

    /// 현재 실행 중인지 여부
    pub fn is_running(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// 주기적으로 `job`을 실행하는 태스크를 띄웁니다.
///
/// 첫 실행은 즉시 일어납니다. 취소 신호가 오면 진행 중인 실행을 끝낸 뒤 종료합니다.
/// 실행이 주기보다 길어지면 다음 틱은 밀립니다.
pub(crate) fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(task = name, interval_secs = period.as_secs(), "periodic task started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!(task = name, "periodic task tick");
                    job().await;
                }
            }
        }

        info!(task = name, "periodic task stopped");
    })
}
