//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`SyslogConfig`](lanwatch_core::config::SyslogConfig)를
//! 기반으로 syslog 수집 경로 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use lanwatch_core::config::LanwatchConfig;
//! use lanwatch_log_pipeline::config::PipelineConfig;
//!
//! let core_config = LanwatchConfig::default();
//! let config = PipelineConfig::from_core(&core_config.syslog);
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// UDP 데이터그램 최대 크기
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// syslog 파이프라인 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// UDP 바인드 주소
    pub bind: String,
    /// 최대 메시지 크기 (바이트). 초과분은 잘라내고 표시합니다.
    pub max_message_size: usize,
    /// 배치 크기 (이 개수만큼 모이면 플러시)
    pub batch_size: usize,
    /// 배치 플러시 간격 (초)
    pub flush_interval_secs: u64,
    /// 백로그 최대 용량
    pub backlog_capacity: usize,
    /// 종료 시 백로그 플러시 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:514".to_owned(),
            max_message_size: 8192,
            batch_size: 100,
            flush_interval_secs: 30,
            backlog_capacity: 10_000,
            shutdown_grace_secs: 5,
        }
    }
}

impl PipelineConfig {
    /// core의 `SyslogConfig`에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &lanwatch_core::config::SyslogConfig) -> Self {
        Self {
            enabled: core.enabled,
            bind: core.bind.clone(),
            max_message_size: core.max_message_size,
            batch_size: core.batch_size,
            flush_interval_secs: core.flush_interval_secs,
            backlog_capacity: core.backlog_capacity,
            shutdown_grace_secs: core.shutdown_grace_secs,
        }
    }

    /// 플러시 간격
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// 종료 유예 시간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_BACKLOG_CAPACITY: usize = 10_000_000;
        const MAX_FLUSH_INTERVAL_SECS: u64 = 3600;

        if self.bind.parse::<SocketAddr>().is_err() {
            return Err(LogPipelineError::Config {
                field: "bind".to_owned(),
                reason: format!("'{}' is not a socket address", self.bind),
            });
        }

        if self.max_message_size == 0 || self.max_message_size > MAX_DATAGRAM_SIZE {
            return Err(LogPipelineError::Config {
                field: "max_message_size".to_owned(),
                reason: format!("must be 1-{MAX_DATAGRAM_SIZE}"),
            });
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(LogPipelineError::Config {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            });
        }

        if self.flush_interval_secs == 0 || self.flush_interval_secs > MAX_FLUSH_INTERVAL_SECS {
            return Err(LogPipelineError::Config {
                field: "flush_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_FLUSH_INTERVAL_SECS}"),
            });
        }

        if self.backlog_capacity == 0 || self.backlog_capacity > MAX_BACKLOG_CAPACITY {
            return Err(LogPipelineError::Config {
                field: "backlog_capacity".to_owned(),
                reason: format!("must be 1-{MAX_BACKLOG_CAPACITY}"),
            });
        }

        if self.backlog_capacity < self.batch_size {
            return Err(LogPipelineError::Config {
                field: "backlog_capacity".to_owned(),
                reason: "must be at least batch_size".to_owned(),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 바인드 주소를 설정합니다.
    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.config.bind = bind.into();
        self
    }

    /// 최대 메시지 크기를 설정합니다.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// 플러시 간격(초)을 설정합니다.
    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.config.flush_interval_secs = secs;
        self
    }

    /// 백로그 용량을 설정합니다.
    pub fn backlog_capacity(mut self, capacity: usize) -> Self {
        self.config.backlog_capacity = capacity;
        self
    }

    /// 종료 유예 시간(초)을 설정합니다.
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
