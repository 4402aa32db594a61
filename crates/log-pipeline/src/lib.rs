#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`collector`]: UDP syslog 수신 및 원시 데이터그램 표현
//! - [`parser`]: RFC 3164 / RFC 5424 파서, 실패 시 원문 보존 레코드로 격하
//! - [`buffer`]: 용량 제한 인메모리 백로그 (가장 오래된 이벤트부터 드롭)
//! - [`queue`]: 수신 루프와 플러시 태스크 사이의 수집 큐, 순번 부여
//! - [`writer`]: 월 파티션 보장, 배치 기록, 행 단위 격리
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! UdpSocket -> SyslogParser -> IngestQueue -> BatchWriter -> TelemetryStore
//!                                  |               |
//!                          drop-oldest backlog   partitions + watermark
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod writer;

pub mod collector;
pub mod parser;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{IngestMonitor, SyslogPipeline, SyslogPipelineBuilder};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 파서
pub use parser::{ParsedSyslog, SyslogParser};

// 수집기
pub use collector::{RawDatagram, SyslogUdpCollector};

// 큐 / 기록기
pub use queue::{IngestQueue, QueueStats};
pub use writer::{BatchWriter, FlushReport, FlushStats, SyslogSink};

// 버퍼
pub use buffer::Backlog;
