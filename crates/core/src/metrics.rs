//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `lanwatch_`
//! - 모듈명: `syslog_`, `store_`, `inventory_`, `correlator_`, `retention_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(lanwatch_core::metrics::SYSLOG_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 스트림 레이블 키 (syslog, snapshot)
pub const LABEL_STREAM: &str = "stream";

/// 매칭 방식 레이블 키 (exact_mac, exact_ip, heuristic)
pub const LABEL_MATCH_TYPE: &str = "match_type";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Syslog 메트릭 ─────────────────────────────────────────────────

/// Syslog: 수신한 데이터그램 수 (counter)
pub const SYSLOG_RECEIVED_TOTAL: &str = "lanwatch_syslog_received_total";

/// Syslog: 원문만 보존된 메시지 수 (counter)
pub const SYSLOG_PARSE_ERRORS_TOTAL: &str = "lanwatch_syslog_parse_errors_total";

/// Syslog: 최대 크기 초과로 잘린 메시지 수 (counter)
pub const SYSLOG_TRUNCATED_TOTAL: &str = "lanwatch_syslog_truncated_total";

/// Syslog: 백로그 초과로 버려진 이벤트 수 (counter)
pub const SYSLOG_DROPPED_TOTAL: &str = "lanwatch_syslog_dropped_total";

/// Syslog: 현재 백로그 길이 (gauge)
pub const SYSLOG_BACKLOG_SIZE: &str = "lanwatch_syslog_backlog_size";

/// Syslog: 커밋된 이벤트 수 (counter)
pub const SYSLOG_EVENTS_WRITTEN_TOTAL: &str = "lanwatch_syslog_events_written_total";

/// Syslog: 실패한 플러시 수 (counter)
pub const SYSLOG_FLUSH_FAILURES_TOTAL: &str = "lanwatch_syslog_flush_failures_total";

/// Syslog: 행 단위 격리로 거부된 행 수 (counter)
pub const SYSLOG_ROWS_REJECTED_TOTAL: &str = "lanwatch_syslog_rows_rejected_total";

/// Syslog: 플러시 소요 시간 (histogram, 초)
pub const SYSLOG_FLUSH_DURATION_SECONDS: &str = "lanwatch_syslog_flush_duration_seconds";

/// Syslog: 커밋된 워터마크 (gauge)
pub const SYSLOG_WATERMARK: &str = "lanwatch_syslog_watermark";

// ─── Store 메트릭 ──────────────────────────────────────────────────

/// Store: 재시도 횟수 (counter)
pub const STORE_RETRIES_TOTAL: &str = "lanwatch_store_retries_total";

/// Store: 작업 시간 초과 수 (counter)
pub const STORE_TIMEOUTS_TOTAL: &str = "lanwatch_store_timeouts_total";

/// Store: 서킷 브레이커 열림 여부 (gauge, 0/1)
pub const STORE_BREAKER_OPEN: &str = "lanwatch_store_breaker_open";

/// Store: 파티션 생성 실패 수 (counter, label: stream)
pub const STORE_PARTITION_FAILURES_TOTAL: &str = "lanwatch_store_partition_failures_total";

// ─── Inventory 메트릭 ──────────────────────────────────────────────

/// Inventory: 기록된 스냅샷 수 (counter)
pub const INVENTORY_SNAPSHOTS_RECORDED_TOTAL: &str = "lanwatch_inventory_snapshots_recorded_total";

/// Inventory: 새로 발견된 디바이스 수 (counter)
pub const INVENTORY_DEVICES_CREATED_TOTAL: &str = "lanwatch_inventory_devices_created_total";

/// Inventory: MAC 누락/오류로 거부된 레코드 수 (counter)
pub const INVENTORY_RECORDS_REJECTED_TOTAL: &str = "lanwatch_inventory_records_rejected_total";

/// Inventory: 디바이스 단위 기록 실패 수 (counter)
pub const INVENTORY_RECORD_FAILURES_TOTAL: &str = "lanwatch_inventory_record_failures_total";

/// Inventory: 종료 시 기록하지 못하고 버린 스냅샷 사이클 수 (counter)
pub const INVENTORY_FEED_CYCLES_DROPPED_TOTAL: &str = "lanwatch_inventory_feed_cycles_dropped_total";

/// Inventory: 오프라인으로 전이된 디바이스 수 (counter)
pub const INVENTORY_DEVICES_OFFLINE_TOTAL: &str = "lanwatch_inventory_devices_offline_total";

/// Inventory: 온라인 디바이스 수 (gauge)
pub const INVENTORY_DEVICES_ONLINE: &str = "lanwatch_inventory_devices_online";

// ─── Correlator 메트릭 ─────────────────────────────────────────────

/// Correlator: 스캔한 이벤트 수 (counter)
pub const CORRELATOR_EVENTS_SCANNED_TOTAL: &str = "lanwatch_correlator_events_scanned_total";

/// Correlator: 생성된 링크 수 (counter, label: match_type)
pub const CORRELATOR_LINKS_CREATED_TOTAL: &str = "lanwatch_correlator_links_created_total";

// ─── Retention 메트릭 ──────────────────────────────────────────────

/// Retention: 삭제된 행 수 (counter, label: stream)
pub const RETENTION_ROWS_DELETED_TOTAL: &str = "lanwatch_retention_rows_deleted_total";

/// Retention: 삭제된 파티션 수 (counter, label: stream)
pub const RETENTION_PARTITIONS_DROPPED_TOTAL: &str = "lanwatch_retention_partitions_dropped_total";

/// Retention: 실패한 정리 작업 수 (counter)
pub const RETENTION_RUN_FAILURES_TOTAL: &str = "lanwatch_retention_run_failures_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "lanwatch_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1)
pub const DAEMON_BUILD_INFO: &str = "lanwatch_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 플러시 지연 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 30s 범위 (재시도 대기 포함)
pub const FLUSH_DURATION_BUCKETS: [f64; 10] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `lanwatch-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Syslog
    describe_counter!(
        SYSLOG_RECEIVED_TOTAL,
        "Total number of syslog datagrams received"
    );
    describe_counter!(
        SYSLOG_PARSE_ERRORS_TOTAL,
        "Total number of syslog messages kept as raw-only records"
    );
    describe_counter!(
        SYSLOG_TRUNCATED_TOTAL,
        "Total number of syslog messages truncated to max_message_size"
    );
    describe_counter!(
        SYSLOG_DROPPED_TOTAL,
        "Total number of syslog events dropped due to backlog overflow"
    );
    describe_gauge!(
        SYSLOG_BACKLOG_SIZE,
        "Current number of syslog events waiting to be flushed"
    );
    describe_counter!(
        SYSLOG_EVENTS_WRITTEN_TOTAL,
        "Total number of syslog events committed to storage"
    );
    describe_counter!(
        SYSLOG_FLUSH_FAILURES_TOTAL,
        "Total number of failed batch flush attempts"
    );
    describe_counter!(
        SYSLOG_ROWS_REJECTED_TOTAL,
        "Total number of syslog rows rejected by row-by-row isolation"
    );
    describe_histogram!(
        SYSLOG_FLUSH_DURATION_SECONDS,
        "Time to flush a single syslog batch in seconds"
    );
    describe_gauge!(
        SYSLOG_WATERMARK,
        "Highest committed syslog ingest sequence number"
    );

    // Store
    describe_counter!(
        STORE_RETRIES_TOTAL,
        "Total number of retried storage operations"
    );
    describe_counter!(
        STORE_TIMEOUTS_TOTAL,
        "Total number of storage operations that timed out"
    );
    describe_gauge!(
        STORE_BREAKER_OPEN,
        "Whether the storage circuit breaker is open (1) or closed (0)"
    );
    describe_counter!(
        STORE_PARTITION_FAILURES_TOTAL,
        "Total number of failed partition creations"
    );

    // Inventory
    describe_counter!(
        INVENTORY_SNAPSHOTS_RECORDED_TOTAL,
        "Total number of device snapshots recorded"
    );
    describe_counter!(
        INVENTORY_DEVICES_CREATED_TOTAL,
        "Total number of newly discovered devices"
    );
    describe_counter!(
        INVENTORY_RECORDS_REJECTED_TOTAL,
        "Total number of snapshot records rejected for missing or invalid MAC"
    );
    describe_counter!(
        INVENTORY_RECORD_FAILURES_TOTAL,
        "Total number of per-device snapshot write failures"
    );
    describe_counter!(
        INVENTORY_FEED_CYCLES_DROPPED_TOTAL,
        "Total number of queued snapshot cycles discarded at shutdown"
    );
    describe_counter!(
        INVENTORY_DEVICES_OFFLINE_TOTAL,
        "Total number of online to offline transitions"
    );
    describe_gauge!(
        INVENTORY_DEVICES_ONLINE,
        "Number of devices currently marked online"
    );

    // Correlator
    describe_counter!(
        CORRELATOR_EVENTS_SCANNED_TOTAL,
        "Total number of syslog events scanned for device tokens"
    );
    describe_counter!(
        CORRELATOR_LINKS_CREATED_TOTAL,
        "Total number of syslog to device links created"
    );

    // Retention
    describe_counter!(
        RETENTION_ROWS_DELETED_TOTAL,
        "Total number of rows deleted by retention"
    );
    describe_counter!(
        RETENTION_PARTITIONS_DROPPED_TOTAL,
        "Total number of whole partitions dropped by retention"
    );
    describe_counter!(
        RETENTION_RUN_FAILURES_TOTAL,
        "Total number of failed retention runs"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "lanwatch daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
