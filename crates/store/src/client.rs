//! 저장소 클라이언트 추상화
//!
//! 수집 엔진의 모든 컴포넌트는 [`TelemetryStore`]를 통해서만 저장소에 접근합니다.
//! 운영 코드는 [`SqliteStore`](crate::SqliteStore)를 사용하고,
//! 테스트는 실패를 주입하는 구현으로 교체할 수 있습니다.
//!
//! ```text
//! SyslogPipeline ─┐
//! Recorder ───────┤
//! Sweeper ────────┼──▶ TelemetryStore (trait) ──▶ ConnectionPool ──▶ SQLite
//! Correlator ─────┤
//! Retention ──────┘
//! ```

use std::future::Future;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use lanwatch_core::types::{
    BreakerState, Device, DeviceCounts, DeviceFilter, DeviceMetadataUpdate, DeviceSnapshot,
    LinkedEvent, MacAddress, Observation, ObservationOutcome, SyslogDeviceLink, SyslogEvent,
    WatermarkStream,
};

use crate::error::StoreError;
use crate::partition::{MonthPartition, StreamKind};

/// 트랜잭션 단위 저장소 프리미티브
///
/// 쓰기 작업은 모두 하나의 트랜잭션으로 실행되며, 워터마크는
/// 해당 데이터와 같은 트랜잭션에서 갱신됩니다.
pub trait TelemetryStore: Send + Sync + 'static {
    // ─── 파티션 ───────────────────────────────────────────────────

    /// 파티션이 없으면 생성합니다. 새로 만들었으면 `true`.
    fn ensure_partition(
        &self,
        kind: StreamKind,
        partition: MonthPartition,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// 존재하는 파티션 목록 (오름차순)
    fn list_partitions(
        &self,
        kind: StreamKind,
    ) -> impl Future<Output = Result<Vec<MonthPartition>, StoreError>> + Send;

    /// 파티션 전체를 삭제합니다. 존재했으면 `true`.
    fn drop_partition(
        &self,
        kind: StreamKind,
        partition: MonthPartition,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// 파티션 안에서 `cutoff` 이전 행을 삭제합니다.
    fn prune_partition(
        &self,
        kind: StreamKind,
        partition: MonthPartition,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    // ─── syslog ───────────────────────────────────────────────────

    /// 이벤트 배치를 도착 순서대로 하나의 트랜잭션으로 기록합니다.
    ///
    /// 같은 트랜잭션에서 syslog 워터마크를 배치의 최대 순번으로 올립니다.
    /// 이미 존재하는 순번은 무시하며, 새로 기록된 행 수를 반환합니다.
    fn insert_syslog_batch(
        &self,
        events: &[SyslogEvent],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// `after` 보다 큰 순번의 이벤트를 순번 오름차순으로 최대 `limit`개 조회합니다.
    fn syslog_events_after(
        &self,
        after: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SyslogEvent>, StoreError>> + Send;

    /// 수신 시각 `[from, to)` 구간에서 `after` 보다 큰 순번의 이벤트를
    /// 순번 오름차순으로 최대 `limit`개 조회합니다.
    fn syslog_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SyslogEvent>, StoreError>> + Send;

    // ─── 디바이스 ─────────────────────────────────────────────────

    /// 디바이스 upsert와 스냅샷 insert, 스냅샷 워터마크 갱신을 한 트랜잭션으로 실행합니다.
    fn record_observation(
        &self,
        observation: &Observation,
    ) -> impl Future<Output = Result<ObservationOutcome, StoreError>> + Send;

    /// `last_seen < cutoff`인 온라인 디바이스를 오프라인으로 표시하고 전이된 MAC을 반환합니다.
    fn mark_inactive(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<MacAddress>, StoreError>> + Send;

    /// MAC으로 디바이스를 조회합니다.
    fn find_device(
        &self,
        mac: MacAddress,
    ) -> impl Future<Output = Result<Option<Device>, StoreError>> + Send;

    /// 현재 primary IP가 일치하는 디바이스 목록
    fn devices_by_ip(
        &self,
        ip: IpAddr,
    ) -> impl Future<Output = Result<Vec<Device>, StoreError>> + Send;

    /// 호스트명이 일치하는 디바이스 목록 (대소문자 무시)
    fn devices_by_hostname(
        &self,
        hostname: &str,
    ) -> impl Future<Output = Result<Vec<Device>, StoreError>> + Send;

    /// 필터에 맞는 디바이스 목록 (MAC 오름차순)
    fn list_devices(
        &self,
        filter: &DeviceFilter,
    ) -> impl Future<Output = Result<Vec<Device>, StoreError>> + Send;

    /// 디바이스 집계
    fn device_counts(&self) -> impl Future<Output = Result<DeviceCounts, StoreError>> + Send;

    /// 디바이스의 스냅샷 시계열 `[from, to)` (시각 오름차순)
    fn device_snapshots(
        &self,
        device_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DeviceSnapshot>, StoreError>> + Send;

    /// 운영자 메타데이터를 변경합니다. 디바이스가 없으면 `None`.
    fn update_device_metadata(
        &self,
        mac: MacAddress,
        update: &DeviceMetadataUpdate,
    ) -> impl Future<Output = Result<Option<Device>, StoreError>> + Send;

    // ─── 상관 분석 ────────────────────────────────────────────────

    /// 링크를 삽입합니다 (중복은 무시). `cursor`가 있으면 같은 트랜잭션에서
    /// 상관 분석 워터마크를 올립니다. 새로 생성된 링크 수를 반환합니다.
    fn insert_links(
        &self,
        links: &[SyslogDeviceLink],
        cursor: Option<u64>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// 디바이스에 연결된 이벤트 (최신 순)
    fn device_events(
        &self,
        device_id: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LinkedEvent>, StoreError>> + Send;

    /// `cutoff` 이전 이벤트의 링크를 삭제합니다.
    fn delete_links_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    // ─── 워터마크 / 상태 ──────────────────────────────────────────

    /// 워터마크 조회
    fn read_watermark(
        &self,
        stream: WatermarkStream,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// 저장소 응답 확인
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 공유 서킷 브레이커 상태
    fn breaker_state(&self) -> BreakerState;
}
