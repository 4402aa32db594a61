//! 인벤토리 엔진 설정
//!
//! [`EngineConfig`]는 core의 `[inventory]`, `[retention]` 섹션에서 작업 주기와
//! 상관 분석 파라미터를 가져옵니다. 보존 기간, 비활성 임계값처럼 사이클마다
//! 다시 읽는 값은 [`CycleSettings`](lanwatch_core::settings::CycleSettings)로 전달됩니다.

use std::time::Duration;

use lanwatch_core::config::LanwatchConfig;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// 상관 분석 링크 신뢰도
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidences {
    /// MAC 토큰 일치
    pub mac: f64,
    /// IPv4 토큰과 현재 primary IP 일치
    pub ip: f64,
    /// 발신 호스트명과 디바이스 호스트명 일치
    pub heuristic: f64,
}

impl Default for Confidences {
    fn default() -> Self {
        Self {
            mac: 1.0,
            ip: 0.6,
            heuristic: 0.3,
        }
    }
}

/// 인벤토리 엔진 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 활동 상태 스윕 주기 (초)
    pub sweep_interval_secs: u64,
    /// 상관 분석 주기 (초)
    pub correlation_interval_secs: u64,
    /// 상관 분석 한 번에 읽는 이벤트 수
    pub correlation_batch_size: usize,
    /// 링크 신뢰도
    pub confidences: Confidences,
    /// 스냅샷 피드 채널 용량 (사이클 수)
    pub feed_capacity: usize,
    /// 보존 기간 작업 주기 (초)
    pub retention_interval_secs: u64,
    /// 종료 시 피드에 남은 사이클을 기록하는 최대 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
            correlation_interval_secs: 30,
            correlation_batch_size: 500,
            confidences: Confidences::default(),
            feed_capacity: 16,
            retention_interval_secs: 3600,
            shutdown_grace_secs: 5,
        }
    }
}

impl EngineConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    pub fn from_core(core: &LanwatchConfig) -> Self {
        let inventory = &core.inventory;
        Self {
            enabled: inventory.enabled,
            sweep_interval_secs: inventory.sweep_interval_secs,
            correlation_interval_secs: inventory.correlation_interval_secs,
            correlation_batch_size: inventory.correlation_batch_size,
            confidences: Confidences {
                mac: inventory.mac_confidence,
                ip: inventory.ip_confidence,
                heuristic: inventory.heuristic_confidence,
            },
            feed_capacity: inventory.feed_capacity,
            retention_interval_secs: core.retention.interval_secs,
            shutdown_grace_secs: inventory.shutdown_grace_secs,
        }
    }

    /// 스윕 주기
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 상관 분석 주기
    pub fn correlation_interval(&self) -> Duration {
        Duration::from_secs(self.correlation_interval_secs)
    }

    /// 보존 기간 작업 주기
    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }

    /// 종료 시 피드 드레인 제한 시간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), InventoryError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_FEED_CAPACITY: usize = 10_000;

        for (field, secs) in [
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("correlation_interval_secs", self.correlation_interval_secs),
            ("retention_interval_secs", self.retention_interval_secs),
        ] {
            if secs == 0 {
                return Err(InventoryError::Config {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        if self.correlation_batch_size == 0 || self.correlation_batch_size > MAX_BATCH_SIZE {
            return Err(InventoryError::Config {
                field: "correlation_batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            });
        }

        if self.feed_capacity == 0 || self.feed_capacity > MAX_FEED_CAPACITY {
            return Err(InventoryError::Config {
                field: "feed_capacity".to_owned(),
                reason: format!("must be 1-{MAX_FEED_CAPACITY}"),
            });
        }

        for (field, value) in [
            ("mac_confidence", self.confidences.mac),
            ("ip_confidence", self.confidences.ip),
            ("heuristic_confidence", self.confidences.heuristic),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(InventoryError::Config {
                    field: field.to_owned(),
                    reason: format!("{value} is outside 0.0-1.0"),
                });
            }
        }

        Ok(())
    }
}
