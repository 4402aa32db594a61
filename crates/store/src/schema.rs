//! 스키마 정의 및 초기 검사
//!
//! 기본 테이블(디바이스, 링크, 워터마크)은 열 때 생성하고,
//! 월별 파티션 테이블은 [`partition_ddl`]로 필요할 때 생성합니다.

use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;
use crate::partition::{MonthPartition, StreamKind};
use crate::rows::to_millis;

/// 현재 스키마 버전
pub const SCHEMA_VERSION: i64 = 1;

const BASE_DDL: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS device (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    mac            TEXT    NOT NULL UNIQUE,
    primary_ip     TEXT,
    last_interface TEXT,
    hostname       TEXT,
    nickname       TEXT,
    location       TEXT,
    vendor         TEXT,
    first_seen     INTEGER NOT NULL,
    last_seen      INTEGER NOT NULL,
    active         INTEGER NOT NULL DEFAULT 1,
    tags           TEXT    NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_device_primary_ip ON device(primary_ip);
CREATE INDEX IF NOT EXISTS idx_device_active_last_seen ON device(active, last_seen);

CREATE TABLE IF NOT EXISTS syslog_device_link (
    event_id   INTEGER NOT NULL,
    event_time INTEGER NOT NULL,
    device_id  INTEGER NOT NULL REFERENCES device(id),
    match_type TEXT    NOT NULL,
    confidence REAL    NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (event_id, device_id, match_type)
);
CREATE INDEX IF NOT EXISTS idx_link_device ON syslog_device_link(device_id, event_id);
CREATE INDEX IF NOT EXISTS idx_link_event_time ON syslog_device_link(event_time);

CREATE TABLE IF NOT EXISTS ingest_watermark (
    stream     TEXT    PRIMARY KEY,
    position   INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// 기본 테이블을 생성하고 스키마 버전을 기록합니다.
pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch(BASE_DDL)?;
    tx.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('version', ?1)
         ON CONFLICT(key) DO NOTHING",
        [SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

/// 저장된 스키마 버전이 현재 버전과 일치하는지 검사합니다.
///
/// 불일치는 영구 에러이며 저장소에 의존하는 모듈은 시작하지 않습니다.
pub fn check(conn: &Connection) -> Result<(), StoreError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let stored = stored.ok_or_else(|| StoreError::Schema("schema version missing".to_owned()))?;
    let version: i64 = stored
        .parse()
        .map_err(|_| StoreError::Schema(format!("unreadable schema version '{stored}'")))?;
    if version != SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "schema version {version} does not match expected {SCHEMA_VERSION}"
        )));
    }

    for table in ["device", "syslog_device_link", "ingest_watermark"] {
        if !table_exists(conn, table)? {
            return Err(StoreError::Schema(format!("required table '{table}' missing")));
        }
    }
    Ok(())
}

/// 테이블 존재 여부
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// 파티션 테이블 DDL
///
/// 범위 밖 시각을 가진 행은 CHECK 제약으로 거부됩니다.
pub fn partition_ddl(kind: StreamKind, partition: MonthPartition) -> String {
    let table = kind.table_name(partition);
    let start = to_millis(partition.start());
    let end = to_millis(partition.end());
    match kind {
        StreamKind::DeviceSnapshot => format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id  INTEGER NOT NULL REFERENCES device(id),
                sampled_at INTEGER NOT NULL,
                ip         TEXT,
                interface  TEXT,
                rssi       INTEGER,
                tx_rate    INTEGER,
                rx_rate    INTEGER,
                online     INTEGER NOT NULL,
                raw        TEXT,
                CHECK (sampled_at >= {start} AND sampled_at < {end})
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_{table}_device_sampled
                ON {table}(device_id, sampled_at);"
        ),
        StreamKind::SyslogEvent => format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id          INTEGER PRIMARY KEY,
                received_at INTEGER NOT NULL,
                event_time  INTEGER NOT NULL,
                host        TEXT,
                facility    INTEGER,
                severity    INTEGER,
                tag         TEXT,
                message     TEXT    NOT NULL,
                source      TEXT    NOT NULL,
                raw         TEXT    NOT NULL,
                truncated   INTEGER NOT NULL DEFAULT 0,
                CHECK (received_at >= {start} AND received_at < {end})
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_received ON {table}(received_at);"
        ),
    }
}
