//! 인벤토리 엔진 에러 타입
//!
//! [`InventoryError`]는 스냅샷 기록, 활동 상태 스윕, 상관 분석, 보존 기간 작업에서
//! 발생하는 에러를 표현합니다. `From<InventoryError> for LanwatchError` 구현으로
//! 상위 레이어에 `?` 연산자로 전파됩니다.
//!
//! # 에러 카테고리
//!
//! - **입력**: `InvalidMac`, `DeviceNotFound`, `InvalidQuery`
//! - **설정**: `Config`, `Pattern`
//! - **실행**: `TaskBusy`, `Channel`
//! - **저장소**: `Storage`

use lanwatch_core::error::{LanwatchError, ParseError};
use lanwatch_store::StoreError;

/// 인벤토리 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// MAC 주소 정규화 실패
    #[error("invalid mac address: {0}")]
    InvalidMac(#[from] ParseError),

    /// 디바이스가 존재하지 않음
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// 조회 인자가 허용 범위를 벗어남
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 토큰 패턴 컴파일 실패
    #[error("pattern compile error: {0}")]
    Pattern(String),

    /// 같은 종류의 작업이 이미 실행 중
    #[error("task already running: {task}")]
    TaskBusy {
        /// 작업 이름
        task: &'static str,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<InventoryError> for LanwatchError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Storage(e) => e.into(),
            InventoryError::InvalidMac(e) => LanwatchError::Parse(e),
            other => LanwatchError::Inventory(other.to_string()),
        }
    }
}
