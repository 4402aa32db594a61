//! 사이클 설정 -- 각 주기 작업이 시작 시점에 읽는 설정 값
//!
//! 보존 기간, 비활성 임계값 등은 전역 상태가 아니라 [`CycleSettings`] 값으로
//! 각 컴포넌트에 전달됩니다. 운영자가 값을 바꾸면 [`SettingsHandle`]을 통해
//! 다음 사이클부터 반영됩니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::LanwatchConfig;
use crate::error::ConfigError;

/// 한 사이클 동안 고정되는 설정 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSettings {
    /// 스냅샷 보존 기간 (일)
    pub snapshot_retention_days: u32,
    /// syslog 보존 기간 (일)
    pub syslog_retention_days: u32,
    /// 비활성 임계값 (분)
    pub inactivity_threshold_mins: u32,
    /// 수집기 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 상관 분석 사용 여부
    pub correlation_enabled: bool,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            snapshot_retention_days: 7,
            syslog_retention_days: 30,
            inactivity_threshold_mins: 10,
            poll_interval_secs: 60,
            correlation_enabled: true,
        }
    }
}

impl CycleSettings {
    /// 통합 설정에서 사이클 설정을 생성합니다.
    pub fn from_config(config: &LanwatchConfig) -> Self {
        Self {
            snapshot_retention_days: config.retention.snapshot_retention_days,
            syslog_retention_days: config.retention.syslog_retention_days,
            inactivity_threshold_mins: config.inventory.inactivity_threshold_mins,
            poll_interval_secs: config.inventory.poll_interval_secs,
            correlation_enabled: config.inventory.correlation_enabled,
        }
    }

    /// key/value 설정 한 쌍을 적용합니다.
    ///
    /// 운영자 경로(설정 테이블, 관리 API)가 전달하는 문자열 형식을 받습니다.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: key.to_owned(),
            reason: format!("{reason}: '{value}'"),
        };
        let value = value.trim();
        match key {
            "snapshot_retention_days" => {
                self.snapshot_retention_days =
                    value.parse().map_err(|_| invalid("expected integer"))?;
            }
            "syslog_retention_days" => {
                self.syslog_retention_days =
                    value.parse().map_err(|_| invalid("expected integer"))?;
            }
            "inactivity_threshold_mins" => {
                self.inactivity_threshold_mins =
                    value.parse().map_err(|_| invalid("expected integer"))?;
            }
            "poll_interval_secs" => {
                self.poll_interval_secs = value.parse().map_err(|_| invalid("expected integer"))?;
            }
            "correlation_enabled" => {
                self.correlation_enabled = value.parse().map_err(|_| invalid("expected bool"))?;
            }
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: key.to_owned(),
                    reason: "unknown setting".to_owned(),
                });
            }
        }
        self.validate()
    }

    /// 여러 key/value 쌍을 순서대로 적용합니다.
    pub fn from_pairs<'a>(
        base: Self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut settings = base;
        for (key, value) in pairs {
            settings.apply(key, value)?;
        }
        Ok(settings)
    }

    /// 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, u64); 4] = [
            ("snapshot_retention_days", u64::from(self.snapshot_retention_days)),
            ("syslog_retention_days", u64::from(self.syslog_retention_days)),
            (
                "inactivity_threshold_mins",
                u64::from(self.inactivity_threshold_mins),
            ),
            ("poll_interval_secs", self.poll_interval_secs),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }
        Ok(())
    }

    /// 비활성 임계값
    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.inactivity_threshold_mins))
    }

    /// 스냅샷 보존 기간
    pub fn snapshot_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.snapshot_retention_days))
    }

    /// syslog 보존 기간
    pub fn syslog_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.syslog_retention_days))
    }

    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// 사이클 설정 공유 핸들
///
/// 쓰는 쪽은 [`SettingsHandle::update`]로 새 값을 게시하고,
/// 각 주기 작업은 사이클 시작 시 [`SettingsHandle::current`]로 복사본을 읽습니다.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: std::sync::Arc<watch::Sender<CycleSettings>>,
    rx: watch::Receiver<CycleSettings>,
}

impl SettingsHandle {
    /// 초기 값으로 핸들을 생성합니다.
    pub fn new(initial: CycleSettings) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// 현재 설정의 복사본
    pub fn current(&self) -> CycleSettings {
        self.rx.borrow().clone()
    }

    /// 새 설정을 게시합니다. 검증에 실패하면 기존 값을 유지합니다.
    pub fn update(&self, settings: CycleSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.tx.send_replace(settings);
        Ok(())
    }

    /// key/value 하나를 현재 설정에 적용하여 게시합니다.
    pub fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.current();
        next.apply(key, value)?;
        self.update(next)
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(CycleSettings::default())
    }
}
