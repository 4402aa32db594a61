//! 커넥션 풀
//!
//! SQLite 커넥션을 고정 개수로 열어 두고 세마포어로 동시 사용을 제한합니다.
//! 각 작업은 blocking 스레드에서 실행되며 제한 시간을 넘기면
//! [`StoreError::Timeout`] (일시적 에러)으로 반환됩니다.
//! 모든 호출은 풀이 가진 [`CircuitBreaker`] 하나를 거칩니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lanwatch_core::types::BreakerState;
use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::error::StoreError;

/// 커넥션 풀 설정
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// 커넥션 수
    pub size: usize,
    /// 작업 제한 시간
    pub op_timeout: Duration,
    /// SQLite busy 대기 시간
    pub busy_timeout: Duration,
    /// 브레이커 임계값
    pub breaker_threshold: u32,
    /// 브레이커 냉각 시간
    pub breaker_cooldown: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 4,
            op_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(2),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

/// 세마포어로 제한되는 SQLite 커넥션 풀
pub struct ConnectionPool {
    idle: Arc<Mutex<Vec<Connection>>>,
    permits: Arc<Semaphore>,
    breaker: CircuitBreaker,
    op_timeout: Duration,
    size: usize,
}

impl ConnectionPool {
    /// 데이터베이스 파일을 열어 풀을 만듭니다.
    pub fn open(path: &Path, settings: &PoolSettings) -> Result<Self, StoreError> {
        let size = settings.size.max(1);
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            conns.push(open_connection(path, settings.busy_timeout)?);
        }
        debug!(path = %path.display(), size, "opened storage connection pool");

        Ok(Self {
            idle: Arc::new(Mutex::new(conns)),
            permits: Arc::new(Semaphore::new(size)),
            breaker: CircuitBreaker::new(settings.breaker_threshold, settings.breaker_cooldown),
            op_timeout: settings.op_timeout,
            size,
        })
    }

    /// 커넥션 하나를 빌려 blocking 스레드에서 작업을 실행합니다.
    pub async fn run<T, F>(&self, operation: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        self.breaker.check()?;
        let result = self.run_inner(operation, f).await;
        match &result {
            Err(e) if e.is_transient() => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }
        result
    }

    async fn run_inner<T, F>(&self, operation: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let timeout_err = || {
            metrics::counter!(lanwatch_core::metrics::STORE_TIMEOUTS_TOTAL).increment(1);
            StoreError::Timeout {
                operation: operation.to_owned(),
                timeout_ms: u64::try_from(self.op_timeout.as_millis()).unwrap_or(u64::MAX),
            }
        };

        let permit = tokio::time::timeout(self.op_timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| timeout_err())?
            .map_err(|_| StoreError::Connection("connection pool closed".to_owned()))?;

        let idle = Arc::clone(&self.idle);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut conn = idle
                .lock()
                .pop()
                .ok_or_else(|| StoreError::Connection("no idle connection".to_owned()))?;
            let result = f(&mut conn);
            idle.lock().push(conn);
            result
        });

        // 제한 시간이 지나도 blocking 작업은 끝까지 실행되며, 커넥션과 permit은 그때 반환됩니다.
        match tokio::time::timeout(self.op_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Query(format!(
                "storage task for '{operation}' failed: {join_err}"
            ))),
            Err(_) => Err(timeout_err()),
        }
    }

    /// 브레이커 상태
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// 풀 크기
    pub fn size(&self) -> usize {
        self.size
    }

    /// 현재 사용 가능한 커넥션 수
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)
        .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
    conn.busy_timeout(busy_timeout)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}
