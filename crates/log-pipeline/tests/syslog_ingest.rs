//! 통합 테스트 -- UDP 수신부터 파티션 저장소 기록까지의 전체 흐름 검증

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use lanwatch_core::pipeline::Pipeline;
use lanwatch_core::types::WatermarkStream;
use lanwatch_log_pipeline::{PipelineConfig, SyslogParser, SyslogPipeline, SyslogPipelineBuilder};
use lanwatch_store::{MonthPartition, SqliteStore, StoreSettings, StreamKind, TelemetryStore};
use proptest::prelude::*;
use tokio::net::UdpSocket;

fn config(batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        bind: "127.0.0.1:0".to_owned(),
        batch_size,
        flush_interval_secs: 3600,
        backlog_capacity: 1000,
        shutdown_grace_secs: 5,
        ..PipelineConfig::default()
    }
}

async fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    let store = SqliteStore::open(StoreSettings::at(dir.path().join("lanwatch.db")))
        .await
        .expect("store opens");
    Arc::new(store)
}

fn pipeline(store: &Arc<SqliteStore>, batch_size: usize) -> SyslogPipeline<SqliteStore> {
    SyslogPipelineBuilder::new()
        .config(config(batch_size))
        .sink(Arc::clone(store))
        .build()
        .expect("pipeline builds")
}

async fn send(addr: SocketAddr, lines: &[&str]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for line in lines {
        socket.send_to(line.as_bytes(), addr).await.unwrap();
    }
}

async fn wait_for_backlog(pipeline: &SyslogPipeline<SqliteStore>, received: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.ingest_health().received_total < received {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("datagrams received");
}

#[tokio::test]
async fn datagrams_are_committed_to_monthly_partition() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let mut pipeline = pipeline(&store, 100);

    pipeline.start().await.unwrap();
    let addr = pipeline.local_addr().unwrap();
    send(
        addr,
        &[
            "<134>Jan  1 00:00:00 gw dnsmasq[12]: DHCPACK 192.168.1.20 aa:bb:cc:dd:ee:ff",
            "<13>1 2024-06-01T10:00:00Z nas smartd - - - disk ok",
            "this line has no header",
        ],
    )
    .await;
    wait_for_backlog(&pipeline, 3).await;

    // 배치/주기 모두 미도달: 종료 시 유예 플러시로 기록됨
    pipeline.stop().await.unwrap();

    let events = store.syslog_events_after(0, 10).await.unwrap();
    assert_eq!(
        events.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    assert_eq!(events[0].facility, Some(16));
    assert_eq!(events[0].severity, Some(6));
    assert_eq!(events[0].host.as_deref(), Some("gw"));
    assert_eq!(events[0].tag.as_deref(), Some("dnsmasq"));

    assert_eq!(events[1].host.as_deref(), Some("nas"));
    assert_eq!(
        events[1].event_time,
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    );

    // 헤더 없는 메시지는 원문 그대로 보존
    assert_eq!(events[2].host, None);
    assert_eq!(events[2].facility, None);
    assert_eq!(events[2].raw, "this line has no header");
    assert_eq!(events[2].event_time, events[2].received_at);

    let watermark = store.read_watermark(WatermarkStream::Syslog).await.unwrap();
    assert_eq!(watermark, Some(3));

    let partitions = store.list_partitions(StreamKind::SyslogEvent).await.unwrap();
    assert!(partitions.contains(&MonthPartition::containing(events[0].received_at)));
}

#[tokio::test]
async fn restart_continues_sequence_from_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let mut first = pipeline(&store, 100);
    first.start().await.unwrap();
    send(first.local_addr().unwrap(), &["<13>a: one", "<13>a: two"]).await;
    wait_for_backlog(&first, 2).await;
    first.stop().await.unwrap();

    let mut second = pipeline(&store, 1);
    second.start().await.unwrap();
    send(second.local_addr().unwrap(), &["<13>a: three"]).await;
    wait_for_backlog(&second, 1).await;
    second.stop().await.unwrap();

    let events = store.syslog_events_after(0, 10).await.unwrap();
    assert_eq!(
        events.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(events[2].message, "three");
}

#[tokio::test]
async fn bind_conflict_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut pipeline = SyslogPipelineBuilder::new()
        .config(PipelineConfig {
            bind: taken.local_addr().unwrap().to_string(),
            ..config(10)
        })
        .sink(store)
        .build()
        .unwrap();

    assert!(pipeline.start().await.is_err());
    assert_eq!(pipeline.state_name(), "initialized");
}

proptest! {
    #[test]
    fn pri_round_trips_facility_and_severity(pri in 0u8..=191, body in "[a-z]{1,12}") {
        let line = format!("<{pri}>Mar  3 04:05:06 host {body}: text");
        let parsed = SyslogParser::new().parse(&line, Utc::now());
        prop_assert_eq!(parsed.facility, Some(pri / 8));
        prop_assert_eq!(parsed.severity, Some(pri % 8));
        prop_assert_eq!(parsed.tag.as_deref(), Some(body.as_str()));
    }

    #[test]
    fn out_of_range_pri_keeps_raw_text(pri in 192u16..=999) {
        let line = format!("<{pri}>Mar  3 04:05:06 host app: text");
        let parsed = SyslogParser::new().parse(&line, Utc::now());
        prop_assert_eq!(parsed.facility, None);
        prop_assert_eq!(parsed.message, line);
        prop_assert!(!parsed.well_formed);
    }

    #[test]
    fn arbitrary_input_never_panics(input in ".{0,256}") {
        let parsed = SyslogParser::new().parse(&input, Utc::now());
        if !input.trim_start().starts_with('<') {
            prop_assert!(parsed.facility.is_none());
        }
    }
}
