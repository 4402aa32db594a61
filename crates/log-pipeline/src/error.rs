//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 syslog 수집 경로 내부에서 발생하는 에러를 표현합니다.
//! `From<LogPipelineError> for LanwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use lanwatch_core::error::{LanwatchError, PipelineError};
use lanwatch_store::StoreError;

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// syslog 파싱 실패 (파서 내부용, 수신 루프 밖으로 전파되지 않음)
    #[error("parse error at offset {offset}: {reason}")]
    Parse {
        /// 실패 위치 (바이트 오프셋)
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 소켓 바인드 실패 (시작 시 치명적)
    #[error("failed to bind syslog socket {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 수집기 에러
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// 수집 소스 유형
        source_type: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// 채널/태스크 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LogPipelineError> for LanwatchError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Storage(e) => e.into(),
            LogPipelineError::Io(e) => LanwatchError::Io(e),
            other => LanwatchError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = LogPipelineError::Parse {
            offset: 4,
            reason: "unterminated PRI field".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains("unterminated PRI"));
    }

    #[test]
    fn bind_error_converts_to_pipeline_error() {
        let err = LogPipelineError::Bind {
            addr: "0.0.0.0:514".to_owned(),
            reason: "permission denied".to_owned(),
        };
        let top: LanwatchError = err.into();
        assert!(matches!(top, LanwatchError::Pipeline(_)));
        assert!(top.to_string().contains("0.0.0.0:514"));
    }

    #[test]
    fn storage_error_keeps_storage_category() {
        let err = LogPipelineError::from(StoreError::CircuitOpen);
        let top: LanwatchError = err.into();
        assert!(matches!(top, LanwatchError::Storage(_)));
    }
}
