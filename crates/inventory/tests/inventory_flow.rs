//! 통합 테스트 -- 스냅샷 기록, 상관 분석, 보존 기간 정리를 실제 SQLite 저장소로 검증

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use lanwatch_core::settings::CycleSettings;
use lanwatch_core::types::{MacAddress, MatchType, SnapshotRecord, SyslogEvent};
use lanwatch_inventory::{
    Confidences, Correlator, QueryService, RetentionManager, SnapshotRecorder,
};
use lanwatch_store::{MonthPartition, SqliteStore, StoreSettings, StreamKind, TelemetryStore};

async fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::open(StoreSettings::at(dir.path().join("lanwatch.db")))
            .await
            .expect("store opens"),
    )
}

fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

fn event(seq: u64, received_at: DateTime<Utc>, host: &str, message: &str) -> SyslogEvent {
    SyslogEvent {
        seq,
        received_at,
        event_time: received_at,
        host: Some(host.to_owned()),
        facility: Some(3),
        severity: Some(6),
        tag: Some("daemon".to_owned()),
        message: message.to_owned(),
        source: "192.168.1.1:514".to_owned(),
        raw: format!("<30>{message}"),
        truncated: false,
    }
}

async fn write_events(store: &SqliteStore, events: &[SyslogEvent]) {
    for e in events {
        store
            .ensure_partition(StreamKind::SyslogEvent, MonthPartition::containing(e.received_at))
            .await
            .unwrap();
    }
    store.insert_syslog_batch(events).await.unwrap();
}

async fn seed_devices(store: &Arc<SqliteStore>, at: DateTime<Utc>) {
    let mut nas = SnapshotRecord::new("02:00:00:00:00:01", at)
        .with_ip("192.168.1.10".parse().unwrap())
        .with_interface("eth0");
    nas.hostname = Some("nas".to_owned());
    let phone = SnapshotRecord::new("02:00:00:00:00:02", at)
        .with_ip("192.168.1.11".parse().unwrap())
        .with_interface("wlan0");

    SnapshotRecorder::new(Arc::clone(store))
        .record_cycle(vec![nas, phone])
        .await
        .unwrap();
}

fn correlator(store: &Arc<SqliteStore>, batch_size: usize) -> Correlator<SqliteStore> {
    Correlator::new(Arc::clone(store), Confidences::default(), batch_size).unwrap()
}

#[tokio::test]
async fn correlation_links_by_mac_ip_and_hostname() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let t = ts(2024, 6, 1, 10);
    seed_devices(&store, t).await;

    write_events(
        &store,
        &[
            event(1, t, "gw", "DHCPACK(br-lan) 192.168.1.10 02:00:00:00:00:01 nas"),
            event(2, t, "gw", "connection from 192.168.1.11 port 5353"),
            event(3, t, "NAS", "smartd: disk ok"),
            event(4, t, "gw", "kernel: link up"),
        ],
    )
    .await;

    let report = correlator(&store, 2).run_once().await.unwrap();
    assert_eq!(report.events_scanned, 4);
    assert_eq!(report.links_created, 4);
    assert_eq!(report.cursor, Some(4));

    let query = QueryService::new(Arc::clone(&store));
    let nas_events = query.events("02:00:00:00:00:01", 10).await.unwrap();
    let mut kinds: Vec<(u64, MatchType)> = nas_events
        .iter()
        .map(|l| (l.event.seq, l.match_type))
        .collect();
    kinds.sort_by_key(|(seq, kind)| (*seq, kind.as_str()));
    assert_eq!(
        kinds,
        vec![
            (1, MatchType::ExactIp),
            (1, MatchType::ExactMac),
            (3, MatchType::Heuristic)
        ]
    );
    let mac_link = nas_events
        .iter()
        .find(|l| l.match_type == MatchType::ExactMac)
        .unwrap();
    assert_eq!(mac_link.confidence, 1.0);

    let phone_events = query.events("02:00:00:00:00:02", 10).await.unwrap();
    assert_eq!(phone_events.len(), 1);
    assert_eq!(phone_events[0].match_type, MatchType::ExactIp);
    assert_eq!(phone_events[0].confidence, 0.6);
}

#[tokio::test]
async fn rerunning_correlation_creates_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let t = ts(2024, 6, 2, 8);
    seed_devices(&store, t).await;
    write_events(
        &store,
        &[
            event(1, t, "gw", "assoc 02:00:00:00:00:02"),
            event(2, t + Duration::minutes(1), "gw", "ping 192.168.1.10"),
        ],
    )
    .await;

    let first = correlator(&store, 100).run_once().await.unwrap();
    assert_eq!(first.links_created, 2);

    // 커서가 영속되므로 새 인스턴스도 이어서 시작
    let again = correlator(&store, 100).run_once().await.unwrap();
    assert_eq!(again.events_scanned, 0);
    assert_eq!(again.cursor, Some(2));

    // 같은 구간 재분석: 이벤트는 다시 읽지만 링크는 늘지 않음
    let rescan = correlator(&store, 1)
        .rescan(t - Duration::hours(1), t + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(rescan.events_scanned, 2);
    assert_eq!(rescan.links_created, 0);
}

#[tokio::test]
async fn rescan_fills_links_after_device_appears() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let t = ts(2024, 6, 3, 12);
    write_events(&store, &[event(1, t, "gw", "DHCPREQUEST 02:00:00:00:00:01")]).await;

    // 디바이스가 아직 없으므로 링크 없음, 커서는 전진
    let first = correlator(&store, 100).run_once().await.unwrap();
    assert_eq!(first.links_created, 0);
    assert_eq!(first.cursor, Some(1));

    seed_devices(&store, t + Duration::minutes(5)).await;
    let rescan = correlator(&store, 100)
        .rescan(t, t + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(rescan.links_created, 1);
}

#[tokio::test]
async fn retention_keeps_only_rows_within_window() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let now = ts(2024, 6, 20, 0);
    let recorder = SnapshotRecorder::new(Arc::clone(&store));

    // 스냅샷: 5월(통째로 삭제), 6/8(경계 파티션에서 삭제), 6/19(유지)
    for at in [ts(2024, 5, 20, 0), ts(2024, 6, 8, 0), ts(2024, 6, 19, 0)] {
        recorder
            .record_cycle(vec![SnapshotRecord::new("02:00:00:00:00:01", at)])
            .await
            .unwrap();
    }

    // syslog: 4월(통째로 삭제), 5/10(경계 파티션에서 삭제), 5/25(유지)
    seed_devices(&store, ts(2024, 6, 19, 1)).await;
    write_events(
        &store,
        &[
            event(1, ts(2024, 4, 10, 0), "gw", "old 02:00:00:00:00:01"),
            event(2, ts(2024, 5, 10, 0), "gw", "older 02:00:00:00:00:01"),
            event(3, ts(2024, 5, 25, 0), "gw", "recent 02:00:00:00:00:01"),
        ],
    )
    .await;
    correlator(&store, 100).run_once().await.unwrap();

    let settings = CycleSettings::default();
    let report = RetentionManager::new(Arc::clone(&store))
        .run_once(now, &settings)
        .await
        .unwrap();

    assert_eq!(report.partitions_dropped, 2);
    assert_eq!(report.snapshot_rows_deleted, 1);
    assert_eq!(report.syslog_rows_deleted, 1);
    assert_eq!(report.links_deleted, 2);

    // 스냅샷 보존 7일: 기준 시각 이후 행만 남음
    let device = store
        .find_device(MacAddress::parse("02:00:00:00:00:01").unwrap())
        .await
        .unwrap()
        .expect("devices are never deleted");
    let series = store
        .device_snapshots(device.id, ts(2024, 1, 1, 0), now, 100)
        .await
        .unwrap();
    assert!(series.iter().all(|s| s.sampled_at >= now - Duration::days(7)));
    assert_eq!(series.len(), 2);

    // syslog 보존 30일
    let events = store.syslog_events_after(0, 100).await.unwrap();
    assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3]);
    let linked = store.device_events(device.id, 100).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].event.seq, 3);

    // 이번 달/다음 달 파티션 보장
    let partitions = store.list_partitions(StreamKind::SyslogEvent).await.unwrap();
    assert!(partitions.contains(&MonthPartition::new(2024, 7).unwrap()));
    assert!(!partitions.contains(&MonthPartition::new(2024, 4).unwrap()));
}
