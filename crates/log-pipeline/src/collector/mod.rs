//! 수집 모듈 -- 네트워크에서 원시 syslog 데이터그램을 수신합니다.
//!
//! # 수집 소스
//! - [`SyslogUdpCollector`]: UDP syslog 수신 (RFC 3164 / RFC 5424)
//!
//! # 아키텍처
//! 수집기는 자체 tokio 태스크에서 실행되며, 각 데이터그램을 파싱한 뒤
//! [`IngestQueue`](crate::queue::IngestQueue)에 넣습니다. 큐 삽입은 짧은
//! 비차단 임계 구역이므로 수신 루프를 막지 않습니다.

pub mod syslog_udp;

pub use syslog_udp::SyslogUdpCollector;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// 수신된 원시 데이터그램
///
/// 최대 크기를 넘는 데이터그램은 UTF-8 문자 경계에서 잘리고 `truncated`로 표시됩니다.
#[derive(Debug, Clone)]
pub struct RawDatagram {
    /// 잘린 뒤의 원시 바이트
    pub data: Bytes,
    /// 원시 바이트의 문자열 표현 (잘못된 UTF-8은 대체 문자로 치환)
    pub text: String,
    /// 송신자 주소
    pub source: String,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
    /// 잘렸는지 여부
    pub truncated: bool,
}

impl RawDatagram {
    /// 수신 버퍼에서 데이터그램을 만들며 `max_size`를 넘으면 잘라냅니다.
    pub fn new(
        payload: &[u8],
        source: impl Into<String>,
        received_at: DateTime<Utc>,
        max_size: usize,
    ) -> Self {
        let cut = utf8_floor(payload, max_size);
        let truncated = cut < payload.len();
        let data = Bytes::copy_from_slice(&payload[..cut]);
        let text = String::from_utf8_lossy(&data).into_owned();
        Self {
            data,
            text,
            source: source.into(),
            received_at,
            truncated,
        }
    }

    /// 잘린 뒤의 크기 (바이트)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 빈 데이터그램인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// `max` 이하이면서 UTF-8 연속 바이트 중간이 아닌 가장 큰 위치
fn utf8_floor(payload: &[u8], max: usize) -> usize {
    if payload.len() <= max {
        return payload.len();
    }
    let mut cut = max;
    while cut > 0 && (payload[cut] & 0b1100_0000) == 0b1000_0000 {
        cut -= 1;
    }
    cut
}

/// 수집기 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 실행 대기 중
    Idle,
    /// 실행 중
    Running,
    /// 에러로 중단됨
    Error(String),
    /// 정상 종료됨
    Stopped,
}
