//! syslog-디바이스 상관 분석
//!
//! 아직 분석하지 않은 이벤트를 순번 순서로 읽어 디바이스와 연결합니다.
//!
//! - 메시지 본문의 MAC 토큰 -> 해당 MAC의 디바이스 (`exact_mac`)
//! - 메시지 본문의 IPv4 토큰 -> 현재 primary IP가 같은 디바이스 (`exact_ip`)
//! - 발신 호스트명 -> 호스트명이 같은 디바이스 (`heuristic`)
//!
//! 커서는 저장소의 `correlation` 워터마크이며 링크와 같은 트랜잭션에서 전진합니다.
//! `(event, device, match_type)`은 유일하므로 같은 구간을 다시 분석해도 중복이 생기지 않습니다.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lanwatch_core::metrics as m;
use lanwatch_core::types::{MacAddress, MatchType, SyslogDeviceLink, SyslogEvent, WatermarkStream};
use lanwatch_store::TelemetryStore;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Confidences;
use crate::error::InventoryError;
use crate::task::TaskLock;

/// 콜론/하이픈 구분 6옥텟, 또는 점 구분 3그룹(Cisco) 표기
const MAC_PATTERN: &str = r"(?i)\b(?:[0-9a-f]{2}(?::[0-9a-f]{2}){5}|[0-9a-f]{2}(?:-[0-9a-f]{2}){5}|[0-9a-f]{4}\.[0-9a-f]{4}\.[0-9a-f]{4})\b";

/// 점 구분 4옥텟. 범위 검사는 `Ipv4Addr` 파싱이 담당합니다.
const IPV4_PATTERN: &str = r"\b(?:\d{1,3}\.){3}\d{1,3}\b";

/// 메시지 본문 토큰 추출기
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    mac: Regex,
    ipv4: Regex,
}

impl TokenExtractor {
    /// 패턴을 컴파일합니다.
    pub fn new() -> Result<Self, InventoryError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| InventoryError::Pattern(e.to_string()));
        Ok(Self {
            mac: compile(MAC_PATTERN)?,
            ipv4: compile(IPV4_PATTERN)?,
        })
    }

    /// 본문에 나타난 MAC 주소 (등장 순서, 중복 제거). 전부 0/전부 FF는 제외합니다.
    pub fn macs(&self, text: &str) -> Vec<MacAddress> {
        let mut seen = HashSet::new();
        self.mac
            .find_iter(text)
            .filter(|m| !joins_longer_token(text, m.start(), m.end()))
            .filter_map(|m| MacAddress::parse(m.as_str()).ok())
            .filter(|mac| !mac.is_unspecified_or_broadcast())
            .filter(|mac| seen.insert(*mac))
            .collect()
    }

    /// 본문에 나타난 IPv4 주소 (등장 순서, 중복 제거). 미지정/브로드캐스트 주소는 제외합니다.
    pub fn ipv4s(&self, text: &str) -> Vec<Ipv4Addr> {
        let mut seen = HashSet::new();
        self.ipv4
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<Ipv4Addr>().ok())
            .filter(|ip| !ip.is_unspecified() && !ip.is_broadcast())
            .filter(|ip| seen.insert(*ip))
            .collect()
    }
}

/// 한 번의 분석 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationReport {
    /// 읽은 이벤트 수
    pub events_scanned: u64,
    /// 새로 생성된 링크 수
    pub links_created: u64,
    /// 분석 후 커서 (재분석에서는 변하지 않음)
    pub cursor: Option<u64>,
}

/// 누적 분석 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorrelatorStats {
    pub runs: u64,
    pub events_scanned_total: u64,
    pub links_created_total: u64,
    pub cursor: Option<u64>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// 상관 분석기
pub struct Correlator<S: TelemetryStore> {
    store: Arc<S>,
    extractor: TokenExtractor,
    confidences: Confidences,
    batch_size: usize,
    lock: TaskLock,
    stats: Mutex<CorrelatorStats>,
}

impl<S: TelemetryStore> Correlator<S> {
    /// 새 분석기를 생성합니다.
    pub fn new(
        store: Arc<S>,
        confidences: Confidences,
        batch_size: usize,
    ) -> Result<Self, InventoryError> {
        Ok(Self {
            store,
            extractor: TokenExtractor::new()?,
            confidences,
            batch_size: batch_size.max(1),
            lock: TaskLock::new("correlation"),
            stats: Mutex::new(CorrelatorStats::default()),
        })
    }

    /// 누적 통계 스냅샷
    pub fn stats(&self) -> CorrelatorStats {
        self.stats.lock().clone()
    }

    /// 커서 이후의 이벤트를 모두 분석합니다.
    pub async fn run_once(&self) -> Result<CorrelationReport, InventoryError> {
        let _guard = self.lock.try_acquire()?;

        let mut cursor = self
            .store
            .read_watermark(WatermarkStream::Correlation)
            .await?
            .map(|w| w.max(0) as u64)
            .unwrap_or(0);
        let mut report = CorrelationReport::default();

        loop {
            let events = self.store.syslog_events_after(cursor, self.batch_size).await?;
            let Some(last) = events.last().map(|e| e.seq) else {
                break;
            };

            let links = self.links_for(&events).await?;
            let created = self.store.insert_links(&links, Some(last)).await?;

            cursor = last;
            report.events_scanned += events.len() as u64;
            report.links_created += created;

            if events.len() < self.batch_size {
                break;
            }
        }

        report.cursor = Some(cursor);
        self.record(&report, Some(cursor));
        if report.events_scanned > 0 {
            debug!(
                events = report.events_scanned,
                links = report.links_created,
                cursor,
                "correlation pass done"
            );
        }
        Ok(report)
    }

    /// 수신 시각 `[from, to)` 구간을 다시 분석합니다. 커서는 움직이지 않습니다.
    ///
    /// 이미 있는 링크는 무시되므로, 디바이스 IP/호스트명이 바뀐 뒤 빠진 링크를 채우는 데 씁니다.
    pub async fn rescan(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CorrelationReport, InventoryError> {
        if from >= to {
            return Err(InventoryError::InvalidQuery(format!(
                "rescan window is empty: {from} >= {to}"
            )));
        }
        let _guard = self.lock.try_acquire()?;

        let mut report = CorrelationReport::default();
        let mut after = 0;

        loop {
            let events = self
                .store
                .syslog_events_between(from, to, after, self.batch_size)
                .await?;
            let Some(last) = events.last().map(|e| e.seq) else {
                break;
            };

            let links = self.links_for(&events).await?;
            report.events_scanned += events.len() as u64;
            report.links_created += self.store.insert_links(&links, None).await?;

            after = last;
            if events.len() < self.batch_size {
                break;
            }
        }

        self.record(&report, None);
        info!(
            from = %from,
            to = %to,
            events = report.events_scanned,
            links = report.links_created,
            "correlation rescan done"
        );
        Ok(report)
    }

    fn record(&self, report: &CorrelationReport, cursor: Option<u64>) {
        metrics::counter!(m::CORRELATOR_EVENTS_SCANNED_TOTAL).increment(report.events_scanned);
        metrics::counter!(m::CORRELATOR_LINKS_CREATED_TOTAL).increment(report.links_created);

        let mut stats = self.stats.lock();
        stats.runs += 1;
        stats.events_scanned_total += report.events_scanned;
        stats.links_created_total += report.links_created;
        if cursor.is_some() {
            stats.cursor = cursor;
        }
        stats.last_run_at = Some(Utc::now());
    }

    /// 이벤트 묶음에 대한 링크를 계산합니다. 조회 결과는 묶음 안에서 캐시됩니다.
    async fn links_for(&self, events: &[SyslogEvent]) -> Result<Vec<SyslogDeviceLink>, InventoryError> {
        let mut by_mac: HashMap<MacAddress, Option<i64>> = HashMap::new();
        let mut by_ip: HashMap<Ipv4Addr, Vec<i64>> = HashMap::new();
        let mut by_host: HashMap<String, Vec<i64>> = HashMap::new();
        let mut links = Vec::new();

        for event in events {
            let mut linked: HashSet<(i64, MatchType)> = HashSet::new();
            let mut push = |device_id: i64, match_type: MatchType, confidence: f64| {
                if linked.insert((device_id, match_type)) {
                    links.push(SyslogDeviceLink {
                        event_id: event.seq,
                        event_time: event.received_at,
                        device_id,
                        match_type,
                        confidence,
                    });
                }
            };

            for mac in self.extractor.macs(&event.message) {
                let device_id = match by_mac.get(&mac) {
                    Some(cached) => *cached,
                    None => {
                        let id = self.store.find_device(mac).await?.map(|d| d.id);
                        by_mac.insert(mac, id);
                        id
                    }
                };
                if let Some(id) = device_id {
                    push(id, MatchType::ExactMac, self.confidences.mac);
                }
            }

            for ip in self.extractor.ipv4s(&event.message) {
                if !by_ip.contains_key(&ip) {
                    let ids = self
                        .store
                        .devices_by_ip(IpAddr::V4(ip))
                        .await?
                        .into_iter()
                        .map(|d| d.id)
                        .collect();
                    by_ip.insert(ip, ids);
                }
                for id in by_ip.get(&ip).into_iter().flatten() {
                    push(*id, MatchType::ExactIp, self.confidences.ip);
                }
            }

            if let Some(host) = heuristic_host(event.host.as_deref()) {
                let key = host.to_ascii_lowercase();
                if !by_host.contains_key(&key) {
                    let ids = self
                        .store
                        .devices_by_hostname(host)
                        .await?
                        .into_iter()
                        .map(|d| d.id)
                        .collect();
                    by_host.insert(key.clone(), ids);
                }
                for id in by_host.get(&key).into_iter().flatten() {
                    push(*id, MatchType::Heuristic, self.confidences.heuristic);
                }
            }
        }

        Ok(links)
    }
}

/// 호스트명 매칭에 쓸 수 있는 발신 호스트. NILVALUE와 IP 리터럴은 제외합니다.
fn heuristic_host(host: Option<&str>) -> Option<&str> {
    let host = host?.trim();
    if host.is_empty() || host == "-" || host.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(host)
}

/// 일치 구간 앞뒤가 구분자+16진수로 이어지면 더 긴 토큰(7옥텟 등)의 일부입니다.
fn joins_longer_token(text: &str, start: usize, end: usize) -> bool {
    let glued = |sep: Option<char>, next: Option<char>| {
        matches!(sep, Some(':' | '-' | '.')) && next.is_some_and(|c| c.is_ascii_hexdigit())
    };
    let mut after = text[end..].chars();
    let mut before = text[..start].chars().rev();
    glued(after.next(), after.next()) || glued(before.next(), before.next())
}
