#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`recorder`]: 스냅샷 사이클 기록 (정규화, 중복 제거, 디바이스별 실패 격리)
//! - [`feed`]: 프로세스 내부 스냅샷 피드 채널
//! - [`activity`]: 활동 상태 판정과 오프라인 스윕
//! - [`correlator`]: syslog-디바이스 상관 분석, 구간 재분석
//! - [`retention`]: 파티션 보장과 보존 기간 정리
//! - [`query`]: 조회/메타데이터 변경 서비스
//! - [`service`]: 전체 생명주기 관리 (Pipeline trait 구현)
//! - [`task`]: 작업별 실행 락과 주기 태스크
//! - [`config`]: 엔진 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod activity;
pub mod config;
pub mod correlator;
pub mod error;
pub mod feed;
pub mod query;
pub mod recorder;
pub mod retention;
pub mod service;
pub mod task;

// --- 주요 타입 re-export ---

// 서비스
pub use service::{InventoryService, InventoryServiceBuilder, InventoryStats};

// 설정
pub use config::{Confidences, EngineConfig};

// 에러
pub use error::InventoryError;

// 작업
pub use activity::{ActivitySweeper, SweepReport};
pub use correlator::{CorrelationReport, Correlator, TokenExtractor};
pub use recorder::{RecordReport, SnapshotRecorder};
pub use retention::{RetentionManager, RetentionReport};

// 피드 / 조회
pub use feed::SnapshotFeed;
pub use query::QueryService;
