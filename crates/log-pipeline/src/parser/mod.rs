//! syslog 파싱 모듈
//!
//! [`SyslogParser`]는 RFC 3164와 RFC 5424 형식을 모두 처리하며
//! 해석할 수 없는 입력은 원문 보존 레코드로 격하합니다.
//! [`build_event`]는 수신 메타데이터와 파싱 결과를 합쳐 [`SyslogEvent`]를 만듭니다.

pub mod syslog;

pub use syslog::{ParsedSyslog, SyslogParser};

use lanwatch_core::types::SyslogEvent;

use crate::collector::RawDatagram;

/// 데이터그램과 파싱 결과로 이벤트를 조립합니다.
///
/// 이벤트 시각이 없으면 수신 시각을 사용합니다. 순번은 큐에서 부여합니다.
pub fn build_event(seq: u64, datagram: &RawDatagram, parsed: ParsedSyslog) -> SyslogEvent {
    SyslogEvent {
        seq,
        received_at: datagram.received_at,
        event_time: parsed.timestamp.unwrap_or(datagram.received_at),
        host: parsed.host,
        facility: parsed.facility,
        severity: parsed.severity,
        tag: parsed.tag,
        message: parsed.message,
        source: datagram.source.clone(),
        raw: datagram.text.clone(),
        truncated: datagram.truncated,
    }
}
