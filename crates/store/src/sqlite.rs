//! SQLite 저장소 구현
//!
//! [`SqliteStore`]는 [`TelemetryStore`]의 운영 구현입니다.
//! 모든 작업은 [`ConnectionPool`]의 blocking 스레드에서 실행되고,
//! [`RetryPolicy`]로 일시적 실패를 재시도합니다.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lanwatch_core::config::StoreConfig;
use lanwatch_core::types::{
    BreakerState, Device, DeviceCounts, DeviceFilter, DeviceMetadataUpdate, DeviceSnapshot,
    LinkedEvent, MacAddress, MatchType, Observation, ObservationOutcome, SyslogDeviceLink,
    SyslogEvent, WatermarkStream,
};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::client::TelemetryStore;
use crate::error::StoreError;
use crate::partition::{MonthPartition, StreamKind};
use crate::pool::{ConnectionPool, PoolSettings};
use crate::retry::RetryPolicy;
use crate::rows::{
    DEVICE_COLUMNS, DeviceRow, EVENT_COLUMNS, EventRow, SNAPSHOT_COLUMNS, SnapshotRow,
    from_millis, seq_to_sql, to_millis,
};
use crate::schema;

/// SQLite 저장소 설정
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// 데이터베이스 파일 경로
    pub path: PathBuf,
    /// 커넥션 풀 설정
    pub pool: PoolSettings,
    /// 재시도 정책
    pub retry: RetryPolicy,
}

impl StoreSettings {
    /// 코어 설정의 `[store]` 섹션에서 생성합니다.
    pub fn from_core(config: &StoreConfig) -> Self {
        Self {
            path: PathBuf::from(&config.path),
            pool: PoolSettings {
                size: config.pool_size,
                op_timeout: Duration::from_millis(config.op_timeout_ms),
                busy_timeout: Duration::from_millis(config.busy_timeout_ms),
                breaker_threshold: config.breaker_failure_threshold,
                breaker_cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            },
            retry: RetryPolicy::from_config(config),
        }
    }

    /// 기본 풀/재시도 설정으로 경로만 지정합니다.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: PoolSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// SQLite 기반 [`TelemetryStore`]
pub struct SqliteStore {
    pool: ConnectionPool,
    retry: RetryPolicy,
    path: PathBuf,
}

impl SqliteStore {
    /// 데이터베이스를 열고 기본 스키마를 생성한 뒤 스키마 버전을 검사합니다.
    ///
    /// 스키마 검사 실패는 영구 에러로 반환됩니다.
    pub async fn open(settings: StoreSettings) -> Result<Self, StoreError> {
        if let Some(parent) = settings.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Connection(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let path = settings.path.clone();
        let pool_settings = settings.pool.clone();
        let pool = tokio::task::spawn_blocking(move || ConnectionPool::open(&path, &pool_settings))
            .await
            .map_err(|e| StoreError::Connection(format!("open task failed: {e}")))??;

        pool.run("schema_check", |conn| {
            schema::migrate(conn)?;
            schema::check(conn)
        })
        .await?;

        info!(
            path = %settings.path.display(),
            pool_size = pool.size(),
            schema_version = schema::SCHEMA_VERSION,
            "storage opened"
        );

        Ok(Self {
            pool,
            retry: settings.retry,
            path: settings.path,
        })
    }

    /// 데이터베이스 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 재시도 정책
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 재시도 정책을 적용하여 풀에서 작업을 실행합니다.
    async fn execute<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> Result<T, StoreError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.retry
            .run(operation, || {
                let f = Arc::clone(&f);
                self.pool.run(operation, move |conn| f(conn))
            })
            .await
    }
}

fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// 여러 파티션을 한 스냅샷에서 읽기 위한 읽기 트랜잭션
fn read_tx(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Deferred)?)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

fn advance_watermark(
    tx: &Transaction<'_>,
    stream: WatermarkStream,
    position: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO ingest_watermark (stream, position, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(stream) DO UPDATE SET
             position = MAX(position, excluded.position),
             updated_at = excluded.updated_at",
        params![stream.as_str(), position, to_millis(Utc::now())],
    )?;
    Ok(())
}

fn list_partitions_sync(
    conn: &Connection,
    kind: StreamKind,
) -> Result<Vec<MonthPartition>, StoreError> {
    let mut stmt = conn
        .prepare_cached("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE ?1")?;
    let pattern = format!("{}%", kind.prefix());
    let names = stmt
        .query_map([pattern], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut partitions: Vec<MonthPartition> =
        names.iter().filter_map(|n| kind.parse_table(n)).collect();
    partitions.sort();
    Ok(partitions)
}

fn query_devices(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Device>, StoreError> {
    let sql = format!("SELECT {DEVICE_COLUMNS} FROM device WHERE {where_clause} ORDER BY mac");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params, DeviceRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(Device::try_from).collect()
}

fn find_device_sync(conn: &Connection, mac: &MacAddress) -> Result<Option<Device>, StoreError> {
    let mut devices = query_devices(conn, "mac = ?1", [mac.to_string()])?;
    Ok(devices.pop())
}

fn query_events(
    conn: &Connection,
    table: &str,
    where_clause: &str,
    limit: Option<usize>,
    params: impl rusqlite::Params,
) -> Result<Vec<SyslogEvent>, StoreError> {
    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM {table} WHERE {where_clause} ORDER BY id");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", sql_limit(limit)));
    }
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params, EventRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SyslogEvent::try_from).collect()
}

fn insert_events(conn: &mut Connection, events: &[SyslogEvent]) -> Result<u64, StoreError> {
    let Some(max_seq) = events.iter().map(|e| e.seq).max() else {
        return Ok(0);
    };

    let tx = write_tx(conn)?;
    let mut inserted = 0u64;
    for event in events {
        let table =
            StreamKind::SyslogEvent.table_name(MonthPartition::containing(event.received_at));
        let sql = format!(
            "INSERT INTO {table} ({EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO NOTHING"
        );
        let mut stmt = tx.prepare_cached(&sql)?;
        let changed = stmt.execute(params![
            seq_to_sql(event.seq)?,
            to_millis(event.received_at),
            to_millis(event.event_time),
            event.host,
            event.facility,
            event.severity,
            event.tag,
            event.message,
            event.source,
            event.raw,
            event.truncated,
        ])?;
        inserted += changed as u64;
    }
    advance_watermark(&tx, WatermarkStream::Syslog, seq_to_sql(max_seq)?)?;
    tx.commit()?;
    Ok(inserted)
}

fn record_observation_sync(
    conn: &mut Connection,
    obs: &Observation,
) -> Result<ObservationOutcome, StoreError> {
    let mac = obs.mac.to_string();
    let at = to_millis(obs.observed_at);
    let ip = obs.ip.map(|ip| ip.to_string());

    let tx = write_tx(conn)?;
    let existing: Option<(i64, i64)> = tx
        .query_row(
            "SELECT id, last_seen FROM device WHERE mac = ?1",
            [&mac],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let outcome = match existing {
        None => {
            tx.execute(
                "INSERT INTO device
                     (mac, primary_ip, last_interface, hostname, vendor, first_seen, last_seen, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1)",
                params![mac, ip, obs.interface, obs.hostname, obs.vendor, at],
            )?;
            ObservationOutcome {
                device_id: tx.last_insert_rowid(),
                created: true,
            }
        }
        Some((id, last_seen)) if at >= last_seen => {
            tx.execute(
                "UPDATE device SET
                     primary_ip = COALESCE(?2, primary_ip),
                     last_interface = COALESCE(?3, last_interface),
                     hostname = COALESCE(?4, hostname),
                     vendor = COALESCE(?5, vendor),
                     last_seen = ?6,
                     active = 1
                 WHERE id = ?1",
                params![id, ip, obs.interface, obs.hostname, obs.vendor, at],
            )?;
            ObservationOutcome {
                device_id: id,
                created: false,
            }
        }
        Some((id, _)) => {
            // 늦게 도착한 과거 관측: last_seen과 primary_ip는 유지
            tx.execute(
                "UPDATE device SET
                     first_seen = MIN(first_seen, ?2),
                     hostname = COALESCE(hostname, ?3),
                     vendor = COALESCE(vendor, ?4)
                 WHERE id = ?1",
                params![id, at, obs.hostname, obs.vendor],
            )?;
            ObservationOutcome {
                device_id: id,
                created: false,
            }
        }
    };

    // 제한 시간 초과 후 재시도되어도 (device_id, sampled_at) 당 한 행만 남습니다.
    let table = StreamKind::DeviceSnapshot.table_name(MonthPartition::containing(obs.observed_at));
    tx.execute(
        &format!(
            "INSERT INTO {table}
                 (device_id, sampled_at, ip, interface, rssi, tx_rate, rx_rate, online, raw)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
             ON CONFLICT(device_id, sampled_at) DO NOTHING"
        ),
        params![
            outcome.device_id,
            at,
            ip,
            obs.interface,
            obs.rssi,
            obs.tx_rate,
            obs.rx_rate,
            obs.raw,
        ],
    )?;
    advance_watermark(&tx, WatermarkStream::Snapshot, at)?;
    tx.commit()?;
    Ok(outcome)
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn clearable(value: &Option<String>) -> (bool, Option<String>) {
    match value {
        None => (false, None),
        Some(v) => {
            let trimmed = v.trim();
            (true, (!trimmed.is_empty()).then(|| trimmed.to_owned()))
        }
    }
}

impl TelemetryStore for SqliteStore {
    async fn ensure_partition(
        &self,
        kind: StreamKind,
        partition: MonthPartition,
    ) -> Result<bool, StoreError> {
        let created = self
            .execute("ensure_partition", move |conn| {
                let table = kind.table_name(partition);
                let tx = write_tx(conn)?;
                let existed = schema::table_exists(&tx, &table)?;
                if !existed {
                    tx.execute_batch(&schema::partition_ddl(kind, partition))?;
                }
                tx.commit()?;
                Ok(!existed)
            })
            .await?;
        if created {
            info!(stream = %kind, partition = %partition, "partition created");
        }
        Ok(created)
    }

    async fn list_partitions(&self, kind: StreamKind) -> Result<Vec<MonthPartition>, StoreError> {
        self.execute("list_partitions", move |conn| list_partitions_sync(conn, kind))
            .await
    }

    async fn drop_partition(
        &self,
        kind: StreamKind,
        partition: MonthPartition,
    ) -> Result<bool, StoreError> {
        self.execute("drop_partition", move |conn| {
            let table = kind.table_name(partition);
            let tx = write_tx(conn)?;
            let existed = schema::table_exists(&tx, &table)?;
            if existed {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
            }
            tx.commit()?;
            Ok(existed)
        })
        .await
    }

    async fn prune_partition(
        &self,
        kind: StreamKind,
        partition: MonthPartition,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if cutoff <= partition.start() {
            return Ok(0);
        }
        let cutoff_ms = to_millis(cutoff);
        self.execute("prune_partition", move |conn| {
            let table = kind.table_name(partition);
            let column = kind.time_column();
            let deleted = conn.execute(
                &format!("DELETE FROM {table} WHERE {column} < ?1"),
                [cutoff_ms],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn insert_syslog_batch(&self, events: &[SyslogEvent]) -> Result<u64, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }
        let events = events.to_vec();
        let inserted = self
            .execute("insert_syslog_batch", move |conn| insert_events(conn, &events))
            .await?;
        debug!(inserted, "syslog batch committed");
        Ok(inserted)
    }

    async fn syslog_events_after(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<SyslogEvent>, StoreError> {
        let after = seq_to_sql(after)?;
        self.execute("syslog_events_after", move |conn| {
            // 파티션 사이에 커밋된 플러시가 섞이지 않도록 한 트랜잭션에서 읽음
            let tx = read_tx(conn)?;
            let mut events = Vec::new();
            for partition in list_partitions_sync(&tx, StreamKind::SyslogEvent)? {
                let table = StreamKind::SyslogEvent.table_name(partition);
                events.extend(query_events(
                    &tx,
                    &table,
                    "id > ?1",
                    Some(limit),
                    params![after],
                )?);
            }
            tx.commit()?;
            events.sort_by_key(|e| e.seq);
            events.truncate(limit);
            Ok(events)
        })
        .await
    }

    async fn syslog_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: u64,
        limit: usize,
    ) -> Result<Vec<SyslogEvent>, StoreError> {
        let after = seq_to_sql(after)?;
        self.execute("syslog_events_between", move |conn| {
            let tx = read_tx(conn)?;
            let mut events = Vec::new();
            for partition in list_partitions_sync(&tx, StreamKind::SyslogEvent)? {
                if !partition.overlaps(from, to) {
                    continue;
                }
                let table = StreamKind::SyslogEvent.table_name(partition);
                events.extend(query_events(
                    &tx,
                    &table,
                    "received_at >= ?1 AND received_at < ?2 AND id > ?3",
                    Some(limit),
                    params![to_millis(from), to_millis(to), after],
                )?);
            }
            tx.commit()?;
            events.sort_by_key(|e| e.seq);
            events.truncate(limit);
            Ok(events)
        })
        .await
    }

    async fn record_observation(
        &self,
        observation: &Observation,
    ) -> Result<ObservationOutcome, StoreError> {
        let obs = observation.clone();
        self.execute("record_observation", move |conn| {
            record_observation_sync(conn, &obs)
        })
        .await
    }

    async fn mark_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<MacAddress>, StoreError> {
        let cutoff_ms = to_millis(cutoff);
        self.execute("mark_inactive", move |conn| {
            let tx = write_tx(conn)?;
            let macs = {
                let mut stmt = tx.prepare(
                    "UPDATE device SET active = 0
                     WHERE active = 1 AND last_seen < ?1
                     RETURNING mac",
                )?;
                stmt.query_map([cutoff_ms], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            macs.iter()
                .map(|m| MacAddress::parse(m).map_err(|e| StoreError::Serialization(e.to_string())))
                .collect()
        })
        .await
    }

    async fn find_device(&self, mac: MacAddress) -> Result<Option<Device>, StoreError> {
        self.execute("find_device", move |conn| find_device_sync(conn, &mac))
            .await
    }

    async fn devices_by_ip(&self, ip: IpAddr) -> Result<Vec<Device>, StoreError> {
        let ip = ip.to_string();
        self.execute("devices_by_ip", move |conn| {
            query_devices(conn, "primary_ip = ?1", [ip.as_str()])
        })
        .await
    }

    async fn devices_by_hostname(&self, hostname: &str) -> Result<Vec<Device>, StoreError> {
        let hostname = hostname.trim().to_owned();
        if hostname.is_empty() {
            return Ok(Vec::new());
        }
        self.execute("devices_by_hostname", move |conn| {
            query_devices(conn, "hostname = ?1 COLLATE NOCASE", [hostname.as_str()])
        })
        .await
    }

    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        let active = filter
            .state
            .map(|s| s == lanwatch_core::types::ActivityState::Online);
        let interface = filter.interface.clone();
        self.execute("list_devices", move |conn| {
            query_devices(
                conn,
                "(?1 IS NULL OR active = ?1) AND (?2 IS NULL OR last_interface = ?2)",
                params![active, interface],
            )
        })
        .await
    }

    async fn device_counts(&self) -> Result<DeviceCounts, StoreError> {
        self.execute("device_counts", |conn| {
            let (total, online): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM device",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let mut stmt = conn.prepare_cached(
                "SELECT COALESCE(last_interface, 'unknown'), COUNT(*)
                 FROM device GROUP BY 1 ORDER BY 1",
            )?;
            let by_interface = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .map(|r| r.map(|(k, v)| (k, count(v))))
                .collect::<Result<_, _>>()?;
            Ok(DeviceCounts {
                total: count(total),
                online: count(online),
                offline: count(total - online),
                by_interface,
            })
        })
        .await
    }

    async fn device_snapshots(
        &self,
        device_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeviceSnapshot>, StoreError> {
        self.execute("device_snapshots", move |conn| {
            let mut snapshots = Vec::new();
            for partition in list_partitions_sync(conn, StreamKind::DeviceSnapshot)? {
                if !partition.overlaps(from, to) {
                    continue;
                }
                let table = StreamKind::DeviceSnapshot.table_name(partition);
                let sql = format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM {table}
                     WHERE device_id = ?1 AND sampled_at >= ?2 AND sampled_at < ?3
                     ORDER BY sampled_at LIMIT ?4"
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(
                        params![device_id, to_millis(from), to_millis(to), sql_limit(limit)],
                        SnapshotRow::from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                for row in rows {
                    snapshots.push(DeviceSnapshot::try_from(row)?);
                }
            }
            snapshots.sort_by_key(|s| (s.sampled_at, s.id));
            snapshots.truncate(limit);
            Ok(snapshots)
        })
        .await
    }

    async fn update_device_metadata(
        &self,
        mac: MacAddress,
        update: &DeviceMetadataUpdate,
    ) -> Result<Option<Device>, StoreError> {
        let (set_nickname, nickname) = clearable(&update.nickname);
        let (set_location, location) = clearable(&update.location);
        let tags = update
            .tags
            .as_deref()
            .map(|t| serde_json::to_string(&normalize_tags(t)))
            .transpose()?;
        self.execute("update_device_metadata", move |conn| {
            let changed = conn.execute(
                "UPDATE device SET
                     nickname = CASE WHEN ?2 THEN ?3 ELSE nickname END,
                     location = CASE WHEN ?4 THEN ?5 ELSE location END,
                     tags = COALESCE(?6, tags)
                 WHERE mac = ?1",
                params![
                    mac.to_string(),
                    set_nickname,
                    nickname,
                    set_location,
                    location,
                    tags
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            find_device_sync(conn, &mac)
        })
        .await
    }

    async fn insert_links(
        &self,
        links: &[SyslogDeviceLink],
        cursor: Option<u64>,
    ) -> Result<u64, StoreError> {
        if links.is_empty() && cursor.is_none() {
            return Ok(0);
        }
        let links = links.to_vec();
        let cursor = cursor.map(seq_to_sql).transpose()?;
        self.execute("insert_links", move |conn| {
            let now = to_millis(Utc::now());
            let tx = write_tx(conn)?;
            let mut inserted = 0u64;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO syslog_device_link
                         (event_id, event_time, device_id, match_type, confidence, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(event_id, device_id, match_type) DO NOTHING",
                )?;
                for link in &links {
                    inserted += stmt.execute(params![
                        seq_to_sql(link.event_id)?,
                        to_millis(link.event_time),
                        link.device_id,
                        link.match_type.as_str(),
                        link.confidence,
                        now,
                    ])? as u64;
                }
            }
            if let Some(position) = cursor {
                advance_watermark(&tx, WatermarkStream::Correlation, position)?;
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn device_events(
        &self,
        device_id: i64,
        limit: usize,
    ) -> Result<Vec<LinkedEvent>, StoreError> {
        self.execute("device_events", move |conn| {
            let links: Vec<(i64, i64, String, f64)> = {
                let mut stmt = conn.prepare_cached(
                    "SELECT event_id, event_time, match_type, confidence
                     FROM syslog_device_link
                     WHERE device_id = ?1
                     ORDER BY event_id DESC LIMIT ?2",
                )?;
                stmt.query_map(params![device_id, sql_limit(limit)], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?
            };

            let mut table_present: HashMap<String, bool> = HashMap::new();
            let mut linked = Vec::with_capacity(links.len());
            for (event_id, event_time, match_type, confidence) in links {
                let partition = MonthPartition::containing(from_millis(event_time)?);
                let table = StreamKind::SyslogEvent.table_name(partition);
                let present = match table_present.get(&table) {
                    Some(present) => *present,
                    None => {
                        let present = schema::table_exists(conn, &table)?;
                        table_present.insert(table.clone(), present);
                        present
                    }
                };
                if !present {
                    continue;
                }
                let Some(event) = query_events(conn, &table, "id = ?1", None, [event_id])?.pop() else {
                    continue;
                };
                let match_type = MatchType::from_str_loose(&match_type).ok_or_else(|| {
                    StoreError::Serialization(format!("unknown match type '{match_type}'"))
                })?;
                linked.push(LinkedEvent {
                    event,
                    match_type,
                    confidence,
                });
            }
            Ok(linked)
        })
        .await
    }

    async fn delete_links_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff_ms = to_millis(cutoff);
        self.execute("delete_links_before", move |conn| {
            let deleted = conn.execute(
                "DELETE FROM syslog_device_link WHERE event_time < ?1",
                [cutoff_ms],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn read_watermark(&self, stream: WatermarkStream) -> Result<Option<i64>, StoreError> {
        self.execute("read_watermark", move |conn| {
            Ok(conn
                .query_row(
                    "SELECT position FROM ingest_watermark WHERE stream = ?1",
                    [stream.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.pool
            .run("ping", |conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
    }

    fn breaker_state(&self) -> BreakerState {
        self.pool.breaker_state()
    }
}
