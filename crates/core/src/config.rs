//! 설정 관리 -- lanwatch.toml 파싱 및 런타임 설정
//!
//! [`LanwatchConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LANWATCH_SYSLOG_BIND=0.0.0.0:5514` 형식)
//! 3. 설정 파일 (`lanwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), lanwatch_core::error::LanwatchError> {
//! use lanwatch_core::config::LanwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LanwatchConfig::load("lanwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LanwatchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LanwatchError};

/// lanwatch 통합 설정
///
/// `lanwatch.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// syslog 수신/배치 쓰기 설정
    #[serde(default)]
    pub syslog: SyslogConfig,
    /// 디바이스 인벤토리 설정
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// 보존 기간 설정
    #[serde(default)]
    pub retention: RetentionConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LanwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LanwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LanwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LanwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LanwatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LanwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            LanwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LANWATCH_{SECTION}_{FIELD}`
    /// 예: `LANWATCH_STORE_PATH=/tmp/lanwatch.db`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LANWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LANWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LANWATCH_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "LANWATCH_GENERAL_PID_FILE");

        // Store
        override_string(&mut self.store.path, "LANWATCH_STORE_PATH");
        override_usize(&mut self.store.pool_size, "LANWATCH_STORE_POOL_SIZE");
        override_u64(&mut self.store.op_timeout_ms, "LANWATCH_STORE_OP_TIMEOUT_MS");
        override_u64(
            &mut self.store.busy_timeout_ms,
            "LANWATCH_STORE_BUSY_TIMEOUT_MS",
        );
        override_u32(
            &mut self.store.retry_max_attempts,
            "LANWATCH_STORE_RETRY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.store.retry_base_delay_ms,
            "LANWATCH_STORE_RETRY_BASE_DELAY_MS",
        );
        override_u64(
            &mut self.store.retry_max_delay_ms,
            "LANWATCH_STORE_RETRY_MAX_DELAY_MS",
        );
        override_f64(&mut self.store.retry_jitter, "LANWATCH_STORE_RETRY_JITTER");
        override_u32(
            &mut self.store.breaker_failure_threshold,
            "LANWATCH_STORE_BREAKER_FAILURE_THRESHOLD",
        );
        override_u64(
            &mut self.store.breaker_cooldown_secs,
            "LANWATCH_STORE_BREAKER_COOLDOWN_SECS",
        );

        // Syslog
        override_bool(&mut self.syslog.enabled, "LANWATCH_SYSLOG_ENABLED");
        override_string(&mut self.syslog.bind, "LANWATCH_SYSLOG_BIND");
        override_usize(
            &mut self.syslog.max_message_size,
            "LANWATCH_SYSLOG_MAX_MESSAGE_SIZE",
        );
        override_usize(&mut self.syslog.batch_size, "LANWATCH_SYSLOG_BATCH_SIZE");
        override_u64(
            &mut self.syslog.flush_interval_secs,
            "LANWATCH_SYSLOG_FLUSH_INTERVAL_SECS",
        );
        override_usize(
            &mut self.syslog.backlog_capacity,
            "LANWATCH_SYSLOG_BACKLOG_CAPACITY",
        );
        override_u64(
            &mut self.syslog.shutdown_grace_secs,
            "LANWATCH_SYSLOG_SHUTDOWN_GRACE_SECS",
        );

        // Inventory
        override_bool(&mut self.inventory.enabled, "LANWATCH_INVENTORY_ENABLED");
        override_u64(
            &mut self.inventory.poll_interval_secs,
            "LANWATCH_INVENTORY_POLL_INTERVAL_SECS",
        );
        override_u32(
            &mut self.inventory.inactivity_threshold_mins,
            "LANWATCH_INVENTORY_INACTIVITY_THRESHOLD_MINS",
        );
        override_u64(
            &mut self.inventory.sweep_interval_secs,
            "LANWATCH_INVENTORY_SWEEP_INTERVAL_SECS",
        );
        override_bool(
            &mut self.inventory.correlation_enabled,
            "LANWATCH_INVENTORY_CORRELATION_ENABLED",
        );
        override_u64(
            &mut self.inventory.correlation_interval_secs,
            "LANWATCH_INVENTORY_CORRELATION_INTERVAL_SECS",
        );
        override_usize(
            &mut self.inventory.correlation_batch_size,
            "LANWATCH_INVENTORY_CORRELATION_BATCH_SIZE",
        );
        override_f64(
            &mut self.inventory.mac_confidence,
            "LANWATCH_INVENTORY_MAC_CONFIDENCE",
        );
        override_f64(
            &mut self.inventory.ip_confidence,
            "LANWATCH_INVENTORY_IP_CONFIDENCE",
        );
        override_f64(
            &mut self.inventory.heuristic_confidence,
            "LANWATCH_INVENTORY_HEURISTIC_CONFIDENCE",
        );
        override_usize(
            &mut self.inventory.feed_capacity,
            "LANWATCH_INVENTORY_FEED_CAPACITY",
        );
        override_u64(
            &mut self.inventory.shutdown_grace_secs,
            "LANWATCH_INVENTORY_SHUTDOWN_GRACE_SECS",
        );

        // Retention
        override_u32(
            &mut self.retention.snapshot_retention_days,
            "LANWATCH_RETENTION_SNAPSHOT_RETENTION_DAYS",
        );
        override_u32(
            &mut self.retention.syslog_retention_days,
            "LANWATCH_RETENTION_SYSLOG_RETENTION_DAYS",
        );
        override_u64(
            &mut self.retention.interval_secs,
            "LANWATCH_RETENTION_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LANWATCH_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LANWATCH_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LANWATCH_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "LANWATCH_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LanwatchError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 저장소
        if self.store.path.is_empty() {
            return Err(invalid("store.path", "must not be empty"));
        }
        require_positive("store.pool_size", self.store.pool_size as u64)?;
        require_positive("store.op_timeout_ms", self.store.op_timeout_ms)?;
        require_positive(
            "store.retry_max_attempts",
            u64::from(self.store.retry_max_attempts),
        )?;
        if self.store.retry_base_delay_ms > self.store.retry_max_delay_ms {
            return Err(invalid(
                "store.retry_base_delay_ms",
                "must not exceed store.retry_max_delay_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.store.retry_jitter) {
            return Err(invalid("store.retry_jitter", "must be within 0.0..=1.0"));
        }
        require_positive(
            "store.breaker_failure_threshold",
            u64::from(self.store.breaker_failure_threshold),
        )?;

        // syslog
        if self.syslog.enabled {
            if self.syslog.bind.parse::<std::net::SocketAddr>().is_err() {
                return Err(invalid(
                    "syslog.bind",
                    format!("'{}' is not a valid socket address", self.syslog.bind),
                ));
            }
            if !(64..=65_507).contains(&self.syslog.max_message_size) {
                return Err(invalid(
                    "syslog.max_message_size",
                    "must be within 64..=65507 bytes",
                ));
            }
            require_positive("syslog.batch_size", self.syslog.batch_size as u64)?;
            require_positive("syslog.flush_interval_secs", self.syslog.flush_interval_secs)?;
            if self.syslog.backlog_capacity < self.syslog.batch_size {
                return Err(invalid(
                    "syslog.backlog_capacity",
                    "must be at least syslog.batch_size",
                ));
            }
        }

        // inventory
        if self.inventory.enabled {
            require_positive(
                "inventory.poll_interval_secs",
                self.inventory.poll_interval_secs,
            )?;
            require_positive(
                "inventory.inactivity_threshold_mins",
                u64::from(self.inventory.inactivity_threshold_mins),
            )?;
            require_positive(
                "inventory.sweep_interval_secs",
                self.inventory.sweep_interval_secs,
            )?;
            require_positive(
                "inventory.correlation_interval_secs",
                self.inventory.correlation_interval_secs,
            )?;
            require_positive(
                "inventory.correlation_batch_size",
                self.inventory.correlation_batch_size as u64,
            )?;
            require_positive("inventory.feed_capacity", self.inventory.feed_capacity as u64)?;
            for (field, value) in [
                ("inventory.mac_confidence", self.inventory.mac_confidence),
                ("inventory.ip_confidence", self.inventory.ip_confidence),
                (
                    "inventory.heuristic_confidence",
                    self.inventory.heuristic_confidence,
                ),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(invalid(field, "must be within 0.0..=1.0"));
                }
            }
        }

        // retention
        require_positive(
            "retention.snapshot_retention_days",
            u64::from(self.retention.snapshot_retention_days),
        )?;
        require_positive(
            "retention.syslog_retention_days",
            u64::from(self.retention.syslog_retention_days),
        )?;
        require_positive("retention.interval_secs", self.retention.interval_secs)?;

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LanwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn require_positive(field: &str, value: u64) -> Result<(), LanwatchError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than 0"));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/lanwatch".to_owned(),
            pid_file: "/var/run/lanwatch.pid".to_owned(),
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite 데이터베이스 파일 경로
    pub path: String,
    /// 커넥션 풀 크기
    pub pool_size: usize,
    /// 저장소 작업 하나의 제한 시간 (밀리초)
    pub op_timeout_ms: u64,
    /// SQLite busy 대기 시간 (밀리초)
    pub busy_timeout_ms: u64,
    /// 일시적 실패 최대 재시도 횟수 (첫 시도 포함)
    pub retry_max_attempts: u32,
    /// 재시도 기본 지연 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 재시도 최대 지연 (밀리초)
    pub retry_max_delay_ms: u64,
    /// 재시도 지연 지터 비율 (0.0 ~ 1.0)
    pub retry_jitter: f64,
    /// 서킷 브레이커가 열리는 연속 실패 횟수
    pub breaker_failure_threshold: u32,
    /// 서킷 브레이커 열림 유지 시간 (초)
    pub breaker_cooldown_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/lanwatch/lanwatch.db".to_owned(),
            pool_size: 4,
            op_timeout_ms: 5_000,
            busy_timeout_ms: 2_000,
            retry_max_attempts: 4,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 30_000,
            retry_jitter: 0.2,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 30,
        }
    }
}

/// syslog 수신 및 배치 쓰기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// UDP 바인드 주소
    pub bind: String,
    /// 최대 메시지 크기 (바이트, 초과분은 잘림)
    pub max_message_size: usize,
    /// 배치 크기
    pub batch_size: usize,
    /// 플러시 주기 (초)
    pub flush_interval_secs: u64,
    /// 메모리 백로그 최대 이벤트 수
    pub backlog_capacity: usize,
    /// 종료 시 백로그 플러시 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for SyslogConfig {
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

/// 디바이스 인벤토리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 외부 수집기 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 비활성 판정 임계값 (분)
    pub inactivity_threshold_mins: u32,
    /// 활동 상태 스윕 주기 (초)
    pub sweep_interval_secs: u64,
    /// 상관 분석 사용 여부
    pub correlation_enabled: bool,
    /// 상관 분석 주기 (초)
    pub correlation_interval_secs: u64,
    /// 상관 분석 한 번에 읽는 이벤트 수
    pub correlation_batch_size: usize,
    /// MAC 일치 링크 신뢰도
    pub mac_confidence: f64,
    /// IP 일치 링크 신뢰도
    pub ip_confidence: f64,
    /// 호스트명 일치 링크 신뢰도
    pub heuristic_confidence: f64,
    /// 스냅샷 피드 채널 용량 (사이클 수)
    pub feed_capacity: usize,
    /// 종료 시 대기 중인 피드 사이클을 기록하는 최대 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 60,
            inactivity_threshold_mins: 10,
            sweep_interval_secs: 60,
            correlation_enabled: true,
            correlation_interval_secs: 30,
            correlation_batch_size: 500,
            mac_confidence: 1.0,
            ip_confidence: 0.6,
            heuristic_confidence: 0.3,
            feed_capacity: 16,
            shutdown_grace_secs: 5,
        }
    }
}

/// 보존 기간 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// 스냅샷 보존 기간 (일)
    pub snapshot_retention_days: u32,
    /// syslog 보존 기간 (일)
    pub syslog_retention_days: u32,
    /// 정리 작업 주기 (초)
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            snapshot_retention_days: 7,
            syslog_retention_days: 30,
            interval_secs: 3600,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_f64(target: &mut f64, env_key: &str) {
    override_parsed(target, env_key, "f64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}
