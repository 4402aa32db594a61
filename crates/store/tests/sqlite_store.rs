//! SqliteStore 통합 테스트
//!
//! 디바이스 upsert, 비활성 판정 경계, 링크 멱등성, 파티션 보존 정책을 검증합니다.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lanwatch_core::types::{
    ActivityState, DeviceFilter, MacAddress, MatchType, SnapshotRecord, SyslogDeviceLink,
    SyslogEvent, WatermarkStream,
};
use lanwatch_store::{
    MonthPartition, RetryPolicy, SqliteStore, StoreSettings, StreamKind, TelemetryStore,
};

async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(StoreSettings::at(dir.path().join("data").join("lanwatch.db")))
        .await
        .unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

async fn ensure_months(store: &SqliteStore, kind: StreamKind, months: &[(i32, u32)]) {
    for &(y, m) in months {
        store
            .ensure_partition(kind, MonthPartition::new(y, m).unwrap())
            .await
            .unwrap();
    }
}

fn event(seq: u64, received_at: DateTime<Utc>, host: &str, message: &str) -> SyslogEvent {
    SyslogEvent {
        seq,
        received_at,
        event_time: received_at,
        host: Some(host.to_owned()),
        facility: Some(3),
        severity: Some(6),
        tag: Some("dhcpd".to_owned()),
        message: message.to_owned(),
        source: "10.0.0.1:514".to_owned(),
        raw: message.to_owned(),
        truncated: false,
    }
}

#[tokio::test]
async fn mac_variants_resolve_to_single_device() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 3)]).await;

    let t1 = at(2024, 3, 1, 10, 0);
    let t2 = at(2024, 3, 1, 10, 5);

    // Given: 같은 MAC의 두 가지 표기
    let first = SnapshotRecord::new("aa:bb:cc:dd:ee:ff", t1)
        .with_ip("192.168.1.10".parse().unwrap())
        .normalize()
        .unwrap();
    let second = SnapshotRecord::new("AA-BB-CC-DD-EE-FF", t2)
        .with_ip("192.168.1.11".parse().unwrap())
        .normalize()
        .unwrap();

    // When
    let a = store.record_observation(&first).await.unwrap();
    let b = store.record_observation(&second).await.unwrap();

    // Then: 디바이스는 하나, first_seen/last_seen은 각각 이른/늦은 관측
    assert!(a.created);
    assert!(!b.created);
    assert_eq!(a.device_id, b.device_id);

    let devices = store.list_devices(&DeviceFilter::default()).await.unwrap();
    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.first_seen, t1);
    assert_eq!(device.last_seen, t2);
    assert_eq!(device.primary_ip, Some("192.168.1.11".parse().unwrap()));
    assert!(device.active);

    let snapshots = store
        .device_snapshots(device.id, t1, t2 + Duration::seconds(1), 10)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(
        store.read_watermark(WatermarkStream::Snapshot).await.unwrap(),
        Some(t2.timestamp_millis())
    );
}

#[tokio::test]
async fn late_observation_does_not_move_last_seen() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 3)]).await;

    let newer = at(2024, 3, 2, 12, 0);
    let older = at(2024, 3, 2, 11, 0);
    let mac = "00:11:22:33:44:55";

    store
        .record_observation(
            &SnapshotRecord::new(mac, newer)
                .with_ip("10.0.0.5".parse().unwrap())
                .normalize()
                .unwrap(),
        )
        .await
        .unwrap();
    store
        .record_observation(
            &SnapshotRecord::new(mac, older)
                .with_ip("10.0.0.99".parse().unwrap())
                .normalize()
                .unwrap(),
        )
        .await
        .unwrap();

    let device = store
        .find_device(MacAddress::parse(mac).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device.last_seen, newer);
    assert_eq!(device.first_seen, older);
    assert_eq!(device.primary_ip, Some("10.0.0.5".parse().unwrap()));
}

#[tokio::test]
async fn mark_inactive_threshold_is_inclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 4)]).await;

    let cutoff = at(2024, 4, 10, 9, 0);
    let on_boundary = "02:00:00:00:00:01";
    let just_past = "02:00:00:00:00:02";
    store
        .record_observation(&SnapshotRecord::new(on_boundary, cutoff).normalize().unwrap())
        .await
        .unwrap();
    store
        .record_observation(
            &SnapshotRecord::new(just_past, cutoff - Duration::milliseconds(1))
                .normalize()
                .unwrap(),
        )
        .await
        .unwrap();

    let changed = store.mark_inactive(cutoff).await.unwrap();
    assert_eq!(changed, vec![MacAddress::parse(just_past).unwrap()]);

    // 두 번째 스윕은 전이가 없음
    assert!(store.mark_inactive(cutoff).await.unwrap().is_empty());

    let offline = store
        .list_devices(&DeviceFilter {
            state: Some(ActivityState::Offline),
            interface: None,
        })
        .await
        .unwrap();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].mac.to_string(), "02:00:00:00:00:02");

    // 새 관측은 다시 온라인으로 되돌림
    store
        .record_observation(
            &SnapshotRecord::new(just_past, cutoff + Duration::minutes(1))
                .normalize()
                .unwrap(),
        )
        .await
        .unwrap();
    let counts = store.device_counts().await.unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.online, 2);
    assert_eq!(counts.offline, 0);
}

#[tokio::test]
async fn counts_and_filters_group_by_interface() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 6)]).await;
    let t = at(2024, 6, 1, 8, 0);

    for (mac, iface) in [
        ("10:00:00:00:00:01", Some("wlan-5g")),
        ("10:00:00:00:00:02", Some("wlan-5g")),
        ("10:00:00:00:00:03", Some("lan")),
        ("10:00:00:00:00:04", None),
    ] {
        let mut record = SnapshotRecord::new(mac, t);
        if let Some(iface) = iface {
            record = record.with_interface(iface);
        }
        store
            .record_observation(&record.normalize().unwrap())
            .await
            .unwrap();
    }

    let counts = store.device_counts().await.unwrap();
    assert_eq!(counts.total, 4);
    assert_eq!(counts.by_interface.get("wlan-5g"), Some(&2));
    assert_eq!(counts.by_interface.get("lan"), Some(&1));
    assert_eq!(counts.by_interface.get("unknown"), Some(&1));

    let wifi = store
        .list_devices(&DeviceFilter {
            state: Some(ActivityState::Online),
            interface: Some("wlan-5g".to_owned()),
        })
        .await
        .unwrap();
    assert_eq!(wifi.len(), 2);
    assert!(wifi.windows(2).all(|w| w[0].mac < w[1].mac));
}

#[tokio::test]
async fn snapshot_series_spans_month_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 1), (2024, 2)]).await;

    let mac = "20:00:00:00:00:01";
    let jan = at(2024, 1, 31, 23, 59);
    let feb = at(2024, 2, 1, 0, 1);
    for t in [jan, feb] {
        store
            .record_observation(&SnapshotRecord::new(mac, t).normalize().unwrap())
            .await
            .unwrap();
    }
    let device = store
        .find_device(MacAddress::parse(mac).unwrap())
        .await
        .unwrap()
        .unwrap();

    let series = store
        .device_snapshots(device.id, at(2024, 1, 1, 0, 0), at(2024, 3, 1, 0, 0), 100)
        .await
        .unwrap();
    assert_eq!(
        series.iter().map(|s| s.sampled_at).collect::<Vec<_>>(),
        vec![jan, feb]
    );

    let limited = store
        .device_snapshots(device.id, at(2024, 1, 1, 0, 0), at(2024, 3, 1, 0, 0), 1)
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].sampled_at, jan);
}

#[tokio::test]
async fn links_are_idempotent_and_advance_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let t = at(2024, 5, 5, 5, 0);
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 5)]).await;
    ensure_months(&store, StreamKind::SyslogEvent, &[(2024, 5)]).await;

    let outcome = store
        .record_observation(
            &SnapshotRecord::new("30:00:00:00:00:01", t)
                .normalize()
                .unwrap(),
        )
        .await
        .unwrap();
    store
        .insert_syslog_batch(&[
            event(1, t, "router", "DHCPACK 30:00:00:00:00:01"),
            event(2, t + Duration::seconds(1), "router", "unrelated"),
        ])
        .await
        .unwrap();

    let link = SyslogDeviceLink {
        event_id: 1,
        event_time: t,
        device_id: outcome.device_id,
        match_type: MatchType::ExactMac,
        confidence: 1.0,
    };
    assert_eq!(
        store.insert_links(&[link.clone()], Some(2)).await.unwrap(),
        1
    );
    assert_eq!(store.insert_links(&[link], Some(1)).await.unwrap(), 0);
    assert_eq!(
        store
            .read_watermark(WatermarkStream::Correlation)
            .await
            .unwrap(),
        Some(2)
    );

    let linked = store.device_events(outcome.device_id, 10).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].event.seq, 1);
    assert_eq!(linked[0].match_type, MatchType::ExactMac);
}

#[tokio::test]
async fn retention_drops_whole_months_and_prunes_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::SyslogEvent, &[(2024, 1), (2024, 2)]).await;

    store
        .insert_syslog_batch(&[
            event(1, at(2024, 1, 15, 0, 0), "a", "old"),
            event(2, at(2024, 2, 3, 0, 0), "a", "boundary-old"),
            event(3, at(2024, 2, 20, 0, 0), "a", "recent"),
        ])
        .await
        .unwrap();

    let cutoff = at(2024, 2, 10, 0, 0);
    let jan = MonthPartition::new(2024, 1).unwrap();
    let feb = MonthPartition::new(2024, 2).unwrap();
    assert!(jan.is_entirely_before(cutoff));
    assert!(!feb.is_entirely_before(cutoff));

    assert!(store.drop_partition(StreamKind::SyslogEvent, jan).await.unwrap());
    assert_eq!(
        store
            .prune_partition(StreamKind::SyslogEvent, feb, cutoff)
            .await
            .unwrap(),
        1
    );

    let remaining = store.syslog_events_after(0, 100).await.unwrap();
    assert_eq!(remaining.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3]);

    let window = store
        .syslog_events_between(at(2024, 2, 1, 0, 0), at(2024, 3, 1, 0, 0), 0, 10)
        .await
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(
        store.list_partitions(StreamKind::SyslogEvent).await.unwrap(),
        vec![feb]
    );
}

#[tokio::test]
async fn link_retention_follows_event_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 7)]).await;
    let t = at(2024, 7, 1, 0, 0);
    let device = store
        .record_observation(
            &SnapshotRecord::new("40:00:00:00:00:01", t)
                .normalize()
                .unwrap(),
        )
        .await
        .unwrap();

    let links: Vec<_> = (1..=3)
        .map(|i| SyslogDeviceLink {
            event_id: i,
            event_time: t + Duration::days(i as i64),
            device_id: device.device_id,
            match_type: MatchType::ExactIp,
            confidence: 0.6,
        })
        .collect();
    assert_eq!(store.insert_links(&links, None).await.unwrap(), 3);
    assert_eq!(
        store
            .delete_links_before(t + Duration::days(3))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn observation_retried_after_timeout_keeps_single_snapshot_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lanwatch.db");
    let mut settings = StoreSettings::at(&path);
    settings.pool.op_timeout = std::time::Duration::from_millis(100);
    settings.retry = RetryPolicy {
        max_attempts: 4,
        base_delay: std::time::Duration::from_millis(50),
        max_delay: std::time::Duration::from_millis(200),
        jitter: 0.0,
    };
    let store = SqliteStore::open(settings).await.unwrap();
    ensure_months(&store, StreamKind::DeviceSnapshot, &[(2024, 8)]).await;

    // Given: 다른 커넥션이 250ms 동안 쓰기 잠금을 잡고 있음
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let holder_path = path.clone();
    let holder = std::thread::spawn(move || {
        let conn = rusqlite::Connection::open(holder_path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE").unwrap();
        locked_tx.send(()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(250));
        conn.execute_batch("COMMIT").unwrap();
    });
    locked_rx.recv().unwrap();

    // When: 첫 시도들이 제한 시간을 넘겨 재시도되지만 blocking 작업은 계속 실행됨
    let t = at(2024, 8, 3, 12, 0);
    let obs = SnapshotRecord::new("50:00:00:00:00:01", t)
        .normalize()
        .unwrap();
    store.record_observation(&obs).await.unwrap();
    holder.join().unwrap();
    // 늦게 커밋되는 시도들이 끝날 때까지 대기
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    // Then: 디바이스 하나, 스냅샷 행 하나
    let devices = store.list_devices(&DeviceFilter::default()).await.unwrap();
    assert_eq!(devices.len(), 1);
    let rows = store
        .device_snapshots(devices[0].id, t - Duration::hours(1), t + Duration::hours(1), 100)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sampled_at, t);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cursor_reads_do_not_skip_events_across_month_partitions() {
    const TOTAL: u64 = 200;
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(open_store(&dir).await);
    ensure_months(&store, StreamKind::SyslogEvent, &[(2024, 1), (2024, 2)]).await;

    // Given: 월 경계 양쪽 파티션에 번갈아 커밋하는 플러시
    let writer = {
        let store = std::sync::Arc::clone(&store);
        tokio::spawn(async move {
            for seq in 1..=TOTAL {
                let received_at = if seq % 2 == 0 {
                    at(2024, 1, 31, 23, 59)
                } else {
                    at(2024, 2, 1, 0, 0)
                };
                store
                    .insert_syslog_batch(&[event(seq, received_at, "ap", "m")])
                    .await
                    .unwrap();
            }
        })
    };

    // When: 상관 분석처럼 커서를 따라가며 읽음
    let mut cursor = 0;
    let mut seen = Vec::new();
    tokio::time::timeout(std::time::Duration::from_secs(20), async {
        while cursor < TOTAL {
            let batch = store.syslog_events_after(cursor, 50).await.unwrap();
            if batch.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            for e in batch {
                seen.push(e.seq);
                cursor = e.seq;
            }
        }
    })
    .await
    .unwrap();
    writer.await.unwrap();

    // Then: 순번 누락 없이 모두 읽음
    assert_eq!(seen, (1..=TOTAL).collect::<Vec<_>>());
}
