//! 저장소 에러 타입
//!
//! [`StoreError`]는 저장소 클라이언트에서 발생하는 모든 에러를 표현합니다.
//! [`StoreError::is_transient`]가 재시도 여부를 결정하며,
//! `From<StoreError> for LanwatchError` 변환으로 상위 레이어에 전파됩니다.

use lanwatch_core::error::{LanwatchError, StorageError};
use rusqlite::ErrorCode;

use crate::partition::StreamKind;

/// 저장소 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 데이터베이스 연결/열기 실패
    #[error("connection error: {0}")]
    Connection(String),

    /// 데이터베이스 잠김 (SQLITE_BUSY / SQLITE_LOCKED)
    #[error("database busy: {0}")]
    Busy(String),

    /// 작업 시간 초과
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// 작업 이름
        operation: String,
        /// 제한 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 서킷 브레이커 열림
    #[error("circuit breaker open, storage calls suspended")]
    CircuitOpen,

    /// 대상 파티션 테이블이 없음
    #[error("partition missing: {table}")]
    PartitionMissing {
        /// 파티션 테이블 이름
        table: String,
    },

    /// 제약 조건 위반
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// 스키마 불일치
    #[error("schema error: {0}")]
    Schema(String),

    /// 값 변환 실패
    #[error("serialization error: {0}")]
    Serialization(String),

    /// 기타 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// 재시도로 회복될 수 있는 에러인지 확인합니다.
    ///
    /// 시간 초과, 연결 실패, 잠금, 브레이커 열림은 일시적이며
    /// 제약 위반, 스키마 불일치, 누락된 파티션은 영구적입니다.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Busy(_) | Self::Timeout { .. } | Self::CircuitOpen
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) => {
                let detail = message.clone().unwrap_or_else(|| err.to_string());
                match code.code {
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Busy(detail),
                    ErrorCode::CannotOpen | ErrorCode::NotADatabase => Self::Connection(detail),
                    ErrorCode::ConstraintViolation => Self::Constraint(detail),
                    ErrorCode::SchemaChanged => Self::Schema(detail),
                    _ => classify_message(detail),
                }
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::Serialization(err.to_string()),
            _ => classify_message(err.to_string()),
        }
    }
}

/// `no such table` 메시지를 파티션 누락과 스키마 에러로 구분합니다.
fn classify_message(detail: String) -> StoreError {
    if let Some(table) = detail.strip_prefix("no such table: ") {
        let table = table.trim().to_owned();
        if StreamKind::ALL
            .iter()
            .any(|kind| kind.parse_table(&table).is_some())
        {
            return StoreError::PartitionMissing { table };
        }
        return StoreError::Schema(detail);
    }
    StoreError::Query(detail)
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StoreError> for LanwatchError {
    fn from(err: StoreError) -> Self {
        let storage = match err {
            StoreError::Connection(msg) | StoreError::Busy(msg) => StorageError::Connection(msg),
            StoreError::Timeout { timeout_ms, .. } => StorageError::Timeout(timeout_ms),
            StoreError::CircuitOpen => StorageError::CircuitOpen,
            StoreError::PartitionMissing { table } => StorageError::PartitionMissing(table),
            StoreError::Schema(msg) => StorageError::Schema(msg),
            StoreError::Constraint(msg)
            | StoreError::Serialization(msg)
            | StoreError::Query(msg) => StorageError::Query(msg),
        };
        LanwatchError::Storage(storage)
    }
}
