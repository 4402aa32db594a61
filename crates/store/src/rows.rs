//! 행 ↔ 도메인 타입 변환
//!
//! 시각은 UTC epoch 밀리초 정수로 저장합니다.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use lanwatch_core::types::{Device, DeviceSnapshot, MacAddress, SyslogEvent};
use rusqlite::Row;

use crate::error::StoreError;

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {ms}")))
}

pub fn seq_to_sql(seq: u64) -> Result<i64, StoreError> {
    i64::try_from(seq).map_err(|_| StoreError::Serialization(format!("sequence too large: {seq}")))
}

pub fn seq_from_sql(id: i64) -> Result<u64, StoreError> {
    u64::try_from(id).map_err(|_| StoreError::Serialization(format!("negative sequence: {id}")))
}

fn parse_ip(raw: Option<String>) -> Result<Option<IpAddr>, StoreError> {
    raw.map(|s| {
        s.parse::<IpAddr>()
            .map_err(|e| StoreError::Serialization(format!("invalid ip '{s}': {e}")))
    })
    .transpose()
}

// ─── device ───────────────────────────────────────────────────────

pub const DEVICE_COLUMNS: &str = "id, mac, primary_ip, last_interface, hostname, nickname, \
     location, vendor, first_seen, last_seen, active, tags";

/// `device` 테이블의 원시 행
pub struct DeviceRow {
    id: i64,
    mac: String,
    primary_ip: Option<String>,
    interface: Option<String>,
    hostname: Option<String>,
    nickname: Option<String>,
    location: Option<String>,
    vendor: Option<String>,
    first_seen: i64,
    last_seen: i64,
    active: bool,
    tags: String,
}

impl DeviceRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mac: row.get(1)?,
            primary_ip: row.get(2)?,
            interface: row.get(3)?,
            hostname: row.get(4)?,
            nickname: row.get(5)?,
            location: row.get(6)?,
            vendor: row.get(7)?,
            first_seen: row.get(8)?,
            last_seen: row.get(9)?,
            active: row.get(10)?,
            tags: row.get(11)?,
        })
    }
}

impl TryFrom<DeviceRow> for Device {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            id: row.id,
            mac: MacAddress::parse(&row.mac)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            primary_ip: parse_ip(row.primary_ip)?,
            interface: row.interface,
            hostname: row.hostname,
            nickname: row.nickname,
            location: row.location,
            vendor: row.vendor,
            first_seen: from_millis(row.first_seen)?,
            last_seen: from_millis(row.last_seen)?,
            active: row.active,
            tags: serde_json::from_str(&row.tags)?,
        })
    }
}

// ─── device_snapshot ──────────────────────────────────────────────

pub const SNAPSHOT_COLUMNS: &str =
    "id, device_id, sampled_at, ip, interface, rssi, tx_rate, rx_rate, online, raw";

pub struct SnapshotRow {
    id: i64,
    device_id: i64,
    sampled_at: i64,
    ip: Option<String>,
    interface: Option<String>,
    rssi: Option<i32>,
    tx_rate: Option<i64>,
    rx_rate: Option<i64>,
    online: bool,
    raw: Option<String>,
}

impl SnapshotRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            sampled_at: row.get(2)?,
            ip: row.get(3)?,
            interface: row.get(4)?,
            rssi: row.get(5)?,
            tx_rate: row.get(6)?,
            rx_rate: row.get(7)?,
            online: row.get(8)?,
            raw: row.get(9)?,
        })
    }
}

impl TryFrom<SnapshotRow> for DeviceSnapshot {
    type Error = StoreError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(DeviceSnapshot {
            id: row.id,
            device_id: row.device_id,
            sampled_at: from_millis(row.sampled_at)?,
            ip: parse_ip(row.ip)?,
            interface: row.interface,
            rssi: row.rssi,
            tx_rate: row.tx_rate,
            rx_rate: row.rx_rate,
            online: row.online,
            raw: row.raw,
        })
    }
}

// ─── syslog_event ─────────────────────────────────────────────────

pub const EVENT_COLUMNS: &str =
    "id, received_at, event_time, host, facility, severity, tag, message, source, raw, truncated";

pub struct EventRow {
    id: i64,
    received_at: i64,
    event_time: i64,
    host: Option<String>,
    facility: Option<u8>,
    severity: Option<u8>,
    tag: Option<String>,
    message: String,
    source: String,
    raw: String,
    truncated: bool,
}

impl EventRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            received_at: row.get(1)?,
            event_time: row.get(2)?,
            host: row.get(3)?,
            facility: row.get(4)?,
            severity: row.get(5)?,
            tag: row.get(6)?,
            message: row.get(7)?,
            source: row.get(8)?,
            raw: row.get(9)?,
            truncated: row.get(10)?,
        })
    }
}

impl TryFrom<EventRow> for SyslogEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(SyslogEvent {
            seq: seq_from_sql(row.id)?,
            received_at: from_millis(row.received_at)?,
            event_time: from_millis(row.event_time)?,
            host: row.host,
            facility: row.facility,
            severity: row.severity,
            tag: row.tag,
            message: row.message,
            source: row.source,
            raw: row.raw,
            truncated: row.truncated,
        })
    }
}
