//! 에러 타입 -- 도메인별 에러 정의

/// lanwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LanwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 인벤토리 처리 에러
    #[error("inventory error: {0}")]
    Inventory(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 지원하지 않는 형식
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// 유효하지 않은 MAC 주소
    #[error("invalid mac address '{input}': {reason}")]
    InvalidMac { input: String, reason: String },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 대상 파티션이 존재하지 않음
    #[error("partition missing: {0}")]
    PartitionMissing(String),

    /// 스키마 검사 실패
    #[error("schema check failed: {0}")]
    Schema(String),

    /// 작업 시간 초과
    #[error("storage operation timed out after {0}ms")]
    Timeout(u64),

    /// 서킷 브레이커 열림
    #[error("circuit breaker open")]
    CircuitOpen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_top_level() {
        let err: LanwatchError = ConfigError::InvalidValue {
            field: "store.pool_size".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(err, LanwatchError::Config(_)));
        assert!(err.to_string().contains("store.pool_size"));
    }

    #[test]
    fn storage_error_display_includes_partition() {
        let err: LanwatchError =
            StorageError::PartitionMissing("syslog_event_202401".to_owned()).into();
        assert_eq!(
            err.to_string(),
            "storage error: partition missing: syslog_event_202401"
        );
    }
}
