//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 수집기, 저장소, 인벤토리 엔진이 공유하는 데이터 구조를 정의합니다.
//! 디바이스의 유일한 식별자는 정규화된 [`MacAddress`]입니다.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

// ─── MAC 주소 ──────────────────────────────────────────────────────

/// 정규화된 MAC 주소
///
/// 구분자와 대소문자가 다른 표기(`aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`,
/// `aabb.ccdd.eeff`, `AABBCCDDEEFF`)는 모두 같은 값으로 정규화됩니다.
/// 문자열 표현은 항상 `AA:BB:CC:DD:EE:FF` 형식입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// 바이트 배열에서 생성합니다.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// 임의 표기의 MAC 문자열을 정규화합니다.
    ///
    /// 16진수가 아닌 문자는 제거하고, 남은 16진수 문자가 정확히 12개여야 합니다.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let digits: Vec<u8> = input
            .bytes()
            .filter(u8::is_ascii_hexdigit)
            .map(|b| b.to_ascii_uppercase())
            .collect();

        if digits.len() != 12 {
            return Err(ParseError::InvalidMac {
                input: input.to_owned(),
                reason: format!("expected 12 hex digits, found {}", digits.len()),
            });
        }

        let mut octets = [0u8; 6];
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            octets[i] = (hex_value(pair[0]) << 4) | hex_value(pair[1]);
        }
        Ok(Self(octets))
    }

    /// 원시 바이트
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// 브로드캐스트 또는 전부 0인 주소인지 확인합니다.
    pub fn is_unspecified_or_broadcast(&self) -> bool {
        self.0 == [0; 6] || self.0 == [0xFF; 6]
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

// ─── 디바이스 ──────────────────────────────────────────────────────

/// 인벤토리에 등록된 디바이스
///
/// 첫 스냅샷에서 생성되며 삭제되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// 저장소 내부 ID
    pub id: i64,
    /// 정규화된 MAC (유일 키)
    pub mac: MacAddress,
    /// 마지막으로 관측된 IP
    pub primary_ip: Option<IpAddr>,
    /// 마지막으로 관측된 인터페이스/대역 레이블
    pub interface: Option<String>,
    /// 수집기가 보고한 호스트명
    pub hostname: Option<String>,
    /// 운영자가 지정한 별칭
    pub nickname: Option<String>,
    /// 운영자가 지정한 위치
    pub location: Option<String>,
    /// 제조사
    pub vendor: Option<String>,
    /// 최초 관측 시각
    pub first_seen: DateTime<Utc>,
    /// 최근 관측 시각 (단조 증가)
    pub last_seen: DateTime<Utc>,
    /// 온라인 여부
    pub active: bool,
    /// 운영자 태그
    pub tags: Vec<String>,
}

impl Device {
    /// 표시용 이름: 별칭 → 호스트명 → MAC 순서로 선택합니다.
    pub fn display_name(&self) -> String {
        self.nickname
            .clone()
            .or_else(|| self.hostname.clone())
            .unwrap_or_else(|| self.mac.to_string())
    }

    /// 현재 활동 상태
    pub fn state(&self) -> ActivityState {
        if self.active {
            ActivityState::Online
        } else {
            ActivityState::Offline
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}", self.display_name(), self.mac, self.state())
    }
}

/// 디바이스 활동 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    /// 임계값 안에서 관측됨 (초기 상태)
    #[default]
    Online,
    /// 임계값 동안 관측되지 않음
    Offline,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// 폴링 한 주기의 디바이스 샘플 (불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// 행 ID (파티션 내부)
    pub id: i64,
    /// 디바이스 ID
    pub device_id: i64,
    /// 샘플 시각
    pub sampled_at: DateTime<Utc>,
    /// 관측된 IP
    pub ip: Option<IpAddr>,
    /// 인터페이스/대역 레이블
    pub interface: Option<String>,
    /// 신호 세기 (dBm)
    pub rssi: Option<i32>,
    /// 송신 속도 (kbit/s)
    pub tx_rate: Option<i64>,
    /// 수신 속도 (kbit/s)
    pub rx_rate: Option<i64>,
    /// 온라인 플래그
    pub online: bool,
    /// 원본 페이로드 (JSON)
    pub raw: Option<String>,
}

// ─── 수집기 입력 ───────────────────────────────────────────────────

/// 외부 수집기가 주기마다 전달하는 정규화된 스냅샷 레코드
///
/// `mac`은 필수이며, 나머지는 수집기가 아는 경우에만 채웁니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// MAC 주소 (임의 표기)
    pub mac: String,
    /// 관측된 IP
    #[serde(default)]
    pub ip: Option<IpAddr>,
    /// 인터페이스/대역 레이블
    #[serde(default)]
    pub interface: Option<String>,
    /// 신호 세기 (dBm)
    #[serde(default)]
    pub rssi: Option<i32>,
    /// 송신 속도 (kbit/s)
    #[serde(default)]
    pub tx_rate: Option<i64>,
    /// 수신 속도 (kbit/s)
    #[serde(default)]
    pub rx_rate: Option<i64>,
    /// 호스트명
    #[serde(default)]
    pub hostname: Option<String>,
    /// 제조사
    #[serde(default)]
    pub vendor: Option<String>,
    /// 관측 시각
    pub observed_at: DateTime<Utc>,
    /// 원본 페이로드
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

impl SnapshotRecord {
    /// MAC과 관측 시각만으로 레코드를 만듭니다.
    pub fn new(mac: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            mac: mac.into(),
            ip: None,
            interface: None,
            rssi: None,
            tx_rate: None,
            rx_rate: None,
            hostname: None,
            vendor: None,
            observed_at,
            raw: None,
        }
    }

    /// IP를 지정합니다.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// 인터페이스 레이블을 지정합니다.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// MAC을 정규화하여 저장용 관측값으로 변환합니다.
    pub fn normalize(&self) -> Result<Observation, ParseError> {
        let mac = MacAddress::parse(&self.mac)?;
        Ok(Observation {
            mac,
            ip: self.ip,
            interface: non_empty(self.interface.as_deref()),
            rssi: self.rssi,
            tx_rate: self.tx_rate,
            rx_rate: self.rx_rate,
            hostname: non_empty(self.hostname.as_deref()),
            vendor: non_empty(self.vendor.as_deref()),
            observed_at: self.observed_at,
            raw: self.raw.as_ref().map(|v| v.to_string()),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// MAC 정규화가 끝난 디바이스 관측값
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub mac: MacAddress,
    pub ip: Option<IpAddr>,
    pub interface: Option<String>,
    pub rssi: Option<i32>,
    pub tx_rate: Option<i64>,
    pub rx_rate: Option<i64>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub raw: Option<String>,
}

/// 관측값 기록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationOutcome {
    /// 디바이스 ID
    pub device_id: i64,
    /// 새로 생성된 디바이스인지 여부
    pub created: bool,
}

// ─── Syslog ────────────────────────────────────────────────────────

/// 파싱된 syslog 이벤트 (불변)
///
/// 파싱할 수 없는 메시지도 `host`/`tag`가 비어 있는 원문 레코드로 보존됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyslogEvent {
    /// 수집 순번 (이벤트 ID로도 사용)
    pub seq: u64,
    /// 수신 시각 (파티션 기준)
    pub received_at: DateTime<Utc>,
    /// 이벤트 시각 (없거나 잘못되면 수신 시각)
    pub event_time: DateTime<Utc>,
    /// 발신 호스트
    pub host: Option<String>,
    /// facility (PRI / 8)
    pub facility: Option<u8>,
    /// severity (PRI % 8)
    pub severity: Option<u8>,
    /// 앱/프로세스 태그
    pub tag: Option<String>,
    /// 메시지 본문
    pub message: String,
    /// 수신 소스 (송신자 주소)
    pub source: String,
    /// 원문
    pub raw: String,
    /// 최대 크기 초과로 잘렸는지 여부
    pub truncated: bool,
}

impl fmt::Display for SyslogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}: {}",
            self.seq,
            self.host.as_deref().unwrap_or("-"),
            self.tag.as_deref().unwrap_or("-"),
            self.message,
        )
    }
}

/// syslog 이벤트와 디바이스의 연결 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// 메시지에 MAC 토큰이 포함됨
    ExactMac,
    /// 메시지에 디바이스의 현재 IP가 포함됨
    ExactIp,
    /// 발신 호스트명이 디바이스 호스트명과 일치
    Heuristic,
}

impl MatchType {
    /// 저장용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMac => "exact_mac",
            Self::ExactIp => "exact_ip",
            Self::Heuristic => "heuristic",
        }
    }

    /// 저장용 문자열에서 변환합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact_mac" | "mac" => Some(Self::ExactMac),
            "exact_ip" | "ip" => Some(Self::ExactIp),
            "heuristic" => Some(Self::Heuristic),
            _ => None,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// syslog 이벤트 ↔ 디바이스 링크
///
/// `(event_id, device_id, match_type)` 조합은 유일합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyslogDeviceLink {
    /// 이벤트 ID (수집 순번)
    pub event_id: u64,
    /// 이벤트 수신 시각 (보존 기간 정리용)
    pub event_time: DateTime<Utc>,
    /// 디바이스 ID
    pub device_id: i64,
    /// 매칭 방식
    pub match_type: MatchType,
    /// 신뢰도 (0.0 ~ 1.0)
    pub confidence: f64,
}

/// 디바이스에 연결된 syslog 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEvent {
    pub event: SyslogEvent,
    pub match_type: MatchType,
    pub confidence: f64,
}

// ─── 워터마크 ──────────────────────────────────────────────────────

/// 영속 워터마크 스트림
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkStream {
    /// 커밋된 최대 syslog 수집 순번
    Syslog,
    /// 커밋된 최신 스냅샷 관측 시각 (epoch ms)
    Snapshot,
    /// 상관 분석이 끝난 마지막 이벤트 ID
    Correlation,
}

impl WatermarkStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syslog => "syslog",
            Self::Snapshot => "snapshot",
            Self::Correlation => "correlation",
        }
    }
}

impl fmt::Display for WatermarkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── 조회 ─────────────────────────────────────────────────────────

/// 디바이스 목록 필터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    /// 활동 상태
    pub state: Option<ActivityState>,
    /// 최근 스냅샷의 인터페이스 레이블
    pub interface: Option<String>,
}

/// 디바이스 집계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCounts {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    /// 최근 스냅샷 인터페이스별 디바이스 수
    pub by_interface: BTreeMap<String, u64>,
}

/// 운영자 메타데이터 변경
///
/// `Some("")`은 값을 지우고, `None`은 기존 값을 유지합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadataUpdate {
    pub nickname: Option<String>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl DeviceMetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none() && self.location.is_none() && self.tags.is_none()
    }
}

/// 서킷 브레이커 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// 수집 경로 상태 요약
///
/// 조회 계층이 "아직 데이터 없음"과 "수집 저하"를 구분할 수 있도록 노출합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestHealth {
    /// 현재 백로그 길이
    pub backlog_len: usize,
    /// 백로그 용량
    pub backlog_capacity: usize,
    /// 수신한 데이터그램 수
    pub received_total: u64,
    /// 백로그 초과로 버린 이벤트 수
    pub dropped_total: u64,
    /// 원문만 보존된 (파싱 실패) 메시지 수
    pub parse_errors_total: u64,
    /// 잘린 메시지 수
    pub truncated_total: u64,
    /// 행 단위 격리로 거부된 행 수
    pub rejected_rows_total: u64,
    /// 커밋된 최대 수집 순번
    pub watermark: Option<u64>,
    /// 마지막 성공 플러시 시각
    pub last_flush_at: Option<DateTime<Utc>>,
    /// 마지막 플러시 에러
    pub last_flush_error: Option<String>,
    /// 연속 플러시 실패 횟수
    pub consecutive_failures: u32,
    /// 파티션 생성 실패 횟수
    pub partition_failures: u64,
    /// 저장소 서킷 브레이커 상태
    pub breaker: BreakerState,
}

impl IngestHealth {
    /// 수집이 저하되었는지 판단합니다.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
            || self.breaker != BreakerState::Closed
            || self.last_flush_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_variants_normalize_to_same_value() {
        let variants = [
            "aa:bb:cc:dd:ee:ff",
            "AA:BB:CC:DD:EE:FF",
            "aa-bb-cc-dd-ee-ff",
            "aabb.ccdd.eeff",
            "AABBCCDDEEFF",
            " aabbccddeeff ",
        ];
        let expected = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        for v in variants {
            assert_eq!(MacAddress::parse(v).unwrap(), expected, "variant {v}");
        }
    }

    #[test]
    fn mac_display_is_uppercase_colon_form() {
        let mac = MacAddress::parse("0a1b2c3d4e5f").unwrap();
        assert_eq!(mac.to_string(), "0A:1B:2C:3D:4E:5F");
    }

    #[test]
    fn mac_rejects_wrong_digit_count() {
        assert!(MacAddress::parse("").is_err());
        assert!(MacAddress::parse("aa:bb:cc:dd:ee").is_err());
        assert!(MacAddress::parse("aa:bb:cc:dd:ee:ff:00").is_err());
        let err = MacAddress::parse("not-a-mac").unwrap_err();
        assert!(matches!(err, ParseError::InvalidMac { .. }));
    }

    #[test]
    fn mac_serde_uses_string_form() {
        let mac = MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");
        let back: MacAddress = serde_json::from_str("\"aabbccddeeff\"").unwrap();
        assert_eq!(back, mac);
        assert!(serde_json::from_str::<MacAddress>("\"xyz\"").is_err());
    }

    #[test]
    fn mac_broadcast_detection() {
        assert!(MacAddress::new([0xFF; 6]).is_unspecified_or_broadcast());
        assert!(MacAddress::new([0; 6]).is_unspecified_or_broadcast());
        assert!(!MacAddress::new([0, 1, 2, 3, 4, 5]).is_unspecified_or_broadcast());
    }

    #[test]
    fn snapshot_record_normalize_trims_empty_labels() {
        let record = SnapshotRecord {
            interface: Some("  ".to_owned()),
            hostname: Some(" laptop ".to_owned()),
            ..SnapshotRecord::new("aa-bb-cc-dd-ee-ff", Utc::now())
        };
        let obs = record.normalize().unwrap();
        assert_eq!(obs.mac.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(obs.interface, None);
        assert_eq!(obs.hostname.as_deref(), Some("laptop"));
    }

    #[test]
    fn snapshot_record_without_mac_fails_normalize() {
        let record = SnapshotRecord::new("", Utc::now());
        assert!(record.normalize().is_err());
    }

    #[test]
    fn match_type_string_roundtrip() {
        for mt in [MatchType::ExactMac, MatchType::ExactIp, MatchType::Heuristic] {
            assert_eq!(MatchType::from_str_loose(mt.as_str()), Some(mt));
        }
        assert_eq!(MatchType::from_str_loose("fuzzy"), None);
    }

    #[test]
    fn device_display_name_prefers_nickname() {
        let now = Utc::now();
        let mut device = Device {
            id: 1,
            mac: MacAddress::parse("aabbccddeeff").unwrap(),
            primary_ip: None,
            interface: None,
            hostname: Some("host-a".to_owned()),
            nickname: None,
            location: None,
            vendor: None,
            first_seen: now,
            last_seen: now,
            active: true,
            tags: vec![],
        };
        assert_eq!(device.display_name(), "host-a");
        device.nickname = Some("kitchen tablet".to_owned());
        assert_eq!(device.display_name(), "kitchen tablet");
        device.hostname = None;
        device.nickname = None;
        assert_eq!(device.display_name(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn ingest_health_degraded_on_failures_or_open_breaker() {
        let mut health = IngestHealth::default();
        assert!(!health.is_degraded());
        health.breaker = BreakerState::Open;
        assert!(health.is_degraded());
        health.breaker = BreakerState::Closed;
        health.consecutive_failures = 2;
        assert!(health.is_degraded());
    }
}
