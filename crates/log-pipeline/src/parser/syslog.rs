//! Syslog 파서 (RFC 3164 / RFC 5424)
//!
//! 라우터가 보내는 BSD syslog(RFC 3164)와 RFC 5424 형식을 모두 받습니다.
//!
//! ```text
//! RFC 3164: <PRI>MMM DD HH:MM:SS HOSTNAME TAG[PID]: MSG
//! RFC 5424: <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
//! ```
//!
//! [`SyslogParser::parse`]는 실패하지 않습니다. 헤더를 해석할 수 없으면
//! 호스트/태그가 비어 있고 원문 전체를 메시지로 가진 레코드로 격하됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use lanwatch_log_pipeline::parser::SyslogParser;
//!
//! let parser = SyslogParser::new();
//! let parsed = parser.parse("<134>Jan 1 00:00:00 host app: hello", received_at);
//! assert_eq!(parsed.facility, Some(16));
//! assert_eq!(parsed.tag.as_deref(), Some("app"));
//! ```

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};

use crate::error::LogPipelineError;

/// 유효한 최대 PRI 값 (facility 23 * 8 + severity 7)
const MAX_SYSLOG_PRI: u16 = 191;

/// RFC 3164 태그 최대 길이
const MAX_TAG_LEN: usize = 48;

/// 파싱 결과
///
/// `well_formed`가 `false`이면 헤더 일부를 해석하지 못한 것이며,
/// 수신 루프는 이를 파싱 에러로 집계합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSyslog {
    /// 메시지 헤더의 시각 (없거나 잘못되면 `None`)
    pub timestamp: Option<DateTime<Utc>>,
    /// 발신 호스트
    pub host: Option<String>,
    /// facility (PRI / 8)
    pub facility: Option<u8>,
    /// severity (PRI % 8)
    pub severity: Option<u8>,
    /// 앱/프로세스 태그
    pub tag: Option<String>,
    /// 메시지 본문
    pub message: String,
    /// 헤더를 모두 해석했는지 여부
    pub well_formed: bool,
}

impl ParsedSyslog {
    /// 원문만 보존하는 레코드
    fn raw_only(input: &str) -> Self {
        Self {
            timestamp: None,
            host: None,
            facility: None,
            severity: None,
            tag: None,
            message: input.to_owned(),
            well_formed: false,
        }
    }
}

/// Syslog 파서
///
/// ## 지원 기능
/// - PRI 필드에서 facility/severity 디코딩
/// - RFC 3164 타임스탬프 (연도 없음, 수신 시각 기준으로 보정)
/// - RFC 5424 RFC 3339 타임스탬프, NILVALUE (`-`), Structured Data 건너뛰기
#[derive(Debug, Clone, Default)]
pub struct SyslogParser {
    _private: (),
}

impl SyslogParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// PRI 값에서 facility와 severity를 분리합니다.
    ///
    /// PRI = facility * 8 + severity
    pub fn decode_pri(pri: u8) -> (u8, u8) {
        (pri / 8, pri % 8)
    }

    /// 메시지를 파싱합니다. 실패하지 않습니다.
    ///
    /// `received_at`은 RFC 3164 타임스탬프의 연도 보정에 사용됩니다.
    pub fn parse(&self, input: &str, received_at: DateTime<Utc>) -> ParsedSyslog {
        let trimmed = input.trim_end_matches(['\r', '\n', '\0']).trim_start();

        let (pri, body) = match Self::split_pri(trimmed) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::debug!(error = %e, "syslog header unreadable, keeping raw text");
                return ParsedSyslog::raw_only(trimmed);
            }
        };
        let (facility, severity) = Self::decode_pri(pri);

        let parsed = if let Some(rest) = body.strip_prefix("1 ") {
            Self::parse_rfc5424_body(rest)
        } else {
            Ok(Self::parse_rfc3164_body(body, received_at))
        };

        match parsed {
            Ok(mut parsed) => {
                parsed.facility = Some(facility);
                parsed.severity = Some(severity);
                parsed
            }
            Err(e) => {
                tracing::debug!(error = %e, "syslog body unreadable, keeping PRI only");
                ParsedSyslog {
                    facility: Some(facility),
                    severity: Some(severity),
                    message: body.trim().to_owned(),
                    ..ParsedSyslog::raw_only("")
                }
            }
        }
    }

    /// `<PRI>` 접두사를 분리합니다.
    fn split_pri(input: &str) -> Result<(u8, &str), LogPipelineError> {
        let rest = input.strip_prefix('<').ok_or_else(|| LogPipelineError::Parse {
            offset: 0,
            reason: "missing PRI field (expected '<')".to_owned(),
        })?;

        let pri_end = rest
            .char_indices()
            .take(4)
            .find(|(_, c)| *c == '>')
            .map(|(i, _)| i)
            .ok_or_else(|| LogPipelineError::Parse {
                offset: 1,
                reason: "unterminated PRI field".to_owned(),
            })?;

        let pri_str = &rest[..pri_end];
        if pri_str.is_empty() || !pri_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LogPipelineError::Parse {
                offset: 1,
                reason: format!("invalid PRI value: '{pri_str}'"),
            });
        }
        let pri: u16 = pri_str.parse().map_err(|_| LogPipelineError::Parse {
            offset: 1,
            reason: format!("invalid PRI value: '{pri_str}'"),
        })?;
        if pri > MAX_SYSLOG_PRI {
            return Err(LogPipelineError::Parse {
                offset: 1,
                reason: format!("PRI value {pri} out of valid range (0-{MAX_SYSLOG_PRI})"),
            });
        }
        let pri = u8::try_from(pri).map_err(|_| LogPipelineError::Parse {
            offset: 1,
            reason: format!("PRI value {pri} out of range"),
        })?;

        Ok((pri, &rest[pri_end + 1..]))
    }

    /// RFC 3164 본문을 최선 노력으로 파싱합니다.
    ///
    /// 타임스탬프가 없으면 호스트를 추정하지 않고 태그만 시도합니다.
    fn parse_rfc3164_body(body: &str, received_at: DateTime<Utc>) -> ParsedSyslog {
        if let Some((timestamp, rest)) = Self::split_bsd_timestamp(body, received_at) {
            let (host, rest) = match next_token(rest) {
                Some((host, rest)) if !host.ends_with(':') => (Some(host.to_owned()), rest),
                _ => (None, rest),
            };
            let (tag, message) = split_tag(rest);
            return ParsedSyslog {
                timestamp: Some(timestamp),
                host,
                facility: None,
                severity: None,
                tag,
                message,
                well_formed: true,
            };
        }

        let (tag, message) = split_tag(body);
        ParsedSyslog {
            timestamp: None,
            host: None,
            facility: None,
            severity: None,
            tag,
            message,
            well_formed: false,
        }
    }

    /// `MMM DD HH:MM:SS` 타임스탬프를 분리합니다. 일자는 공백 패딩일 수 있습니다.
    ///
    /// 연도가 없으므로 수신 연도를 사용하며, 그 결과가 수신 시각보다
    /// 하루 이상 미래이면 작년 메시지로 봅니다.
    fn split_bsd_timestamp(
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, &str)> {
        let (month, rest) = next_token(body)?;
        let (day, rest) = next_token(rest)?;
        let (time, rest) = next_token(rest)?;

        let parse_in = |year: i32| {
            NaiveDateTime::parse_from_str(
                &format!("{year} {month} {day} {time}"),
                "%Y %b %d %H:%M:%S",
            )
            .ok()
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        };

        // 올해로 해석되지 않거나(2월 29일) 미래 시각이면 작년으로 봅니다.
        let year = received_at.year();
        let ts = match parse_in(year) {
            Some(ts) if ts <= received_at + Duration::days(1) => ts,
            current => parse_in(year - 1).or(current)?,
        };
        Some((ts, rest))
    }

    /// RFC 5424 본문을 파싱합니다.
    ///
    /// 형식: `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG`
    fn parse_rfc5424_body(body: &str) -> Result<ParsedSyslog, LogPipelineError> {
        let parts: Vec<&str> = body.splitn(6, ' ').collect();
        if parts.len() < 6 {
            return Err(LogPipelineError::Parse {
                offset: 0,
                reason: format!(
                    "RFC 5424 requires 6 fields after version, got {}",
                    parts.len()
                ),
            });
        }

        let mut well_formed = true;
        let timestamp = match nil_to_none(parts[0]) {
            None => None,
            Some(ts) => match DateTime::parse_from_rfc3339(ts) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(_) => {
                    well_formed = false;
                    None
                }
            },
        };

        let host = nil_to_none(parts[1]).map(str::to_owned);
        let tag = nil_to_none(parts[2]).map(str::to_owned);

        let sd_and_msg = parts[5];
        let message = if sd_and_msg.starts_with('[') {
            let (_, msg) = split_sd_and_message(sd_and_msg)?;
            msg
        } else if let Some(msg) = sd_and_msg.strip_prefix("- ") {
            msg
        } else if sd_and_msg == "-" {
            ""
        } else {
            sd_and_msg
        };
        let message = message.strip_prefix('\u{feff}').unwrap_or(message);

        Ok(ParsedSyslog {
            timestamp,
            host,
            facility: None,
            severity: None,
            tag,
            message: message.to_owned(),
            well_formed,
        })
    }
}

/// 선행 공백을 건너뛰고 다음 토큰과 나머지를 반환합니다.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start_matches(' ');
    if input.is_empty() {
        return None;
    }
    match input.find(' ') {
        Some(idx) => Some((&input[..idx], &input[idx + 1..])),
        None => Some((input, "")),
    }
}

/// `TAG[PID]: MSG`에서 태그와 메시지를 분리합니다.
fn split_tag(input: &str) -> (Option<String>, String) {
    let input = input.trim_start_matches(' ');
    let Some(colon) = input.find(':') else {
        return (None, input.to_owned());
    };
    let candidate = &input[..colon];
    if candidate.is_empty() || candidate.len() > MAX_TAG_LEN || candidate.contains(' ') {
        return (None, input.to_owned());
    }
    let tag = match candidate.find('[') {
        Some(bracket) if candidate.ends_with(']') => &candidate[..bracket],
        _ => candidate,
    };
    if tag.is_empty() {
        return (None, input.to_owned());
    }
    let message = input[colon + 1..].trim_start_matches(' ');
    (Some(tag.to_owned()), message.to_owned())
}

fn nil_to_none(value: &str) -> Option<&str> {
    if value == "-" || value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Structured Data 블록(`[...]`이 하나 이상)과 메시지를 분리합니다.
fn split_sd_and_message(input: &str) -> Result<(&str, &str), LogPipelineError> {
    let mut depth = 0u32;
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '[' if !in_quote => depth += 1,
            ']' if !in_quote => {
                depth = depth.saturating_sub(1);
                let next = &input[idx + 1..];
                if depth == 0 && !next.starts_with('[') {
                    return Ok((&input[..=idx], next.trim_start_matches(' ')));
                }
            }
            _ => {}
        }
    }

    Err(LogPipelineError::Parse {
        offset: 0,
        reason: "unterminated structured data".to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn parse(input: &str) -> ParsedSyslog {
        SyslogParser::new().parse(input, received())
    }

    #[test]
    fn decode_pri() {
        assert_eq!(SyslogParser::decode_pri(134), (16, 6));
        assert_eq!(SyslogParser::decode_pri(0), (0, 0));
        assert_eq!(SyslogParser::decode_pri(191), (23, 7));
    }

    #[test]
    fn parse_rfc3164_basic() {
        let parsed = parse("<134>Jan 1 00:00:00 host app: hello");
        assert_eq!(parsed.facility, Some(16));
        assert_eq!(parsed.severity, Some(6));
        assert_eq!(parsed.host.as_deref(), Some("host"));
        assert_eq!(parsed.tag.as_deref(), Some("app"));
        assert_eq!(parsed.message, "hello");
        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(parsed.well_formed);
    }

    #[test]
    fn parse_rfc3164_space_padded_day_and_pid() {
        let parsed = parse("<30>Jun  5 08:15:02 gw dnsmasq-dhcp[812]: DHCPACK(br0) 10.0.0.7");
        assert_eq!(parsed.host.as_deref(), Some("gw"));
        assert_eq!(parsed.tag.as_deref(), Some("dnsmasq-dhcp"));
        assert_eq!(parsed.message, "DHCPACK(br0) 10.0.0.7");
        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 6, 5, 8, 15, 2).unwrap())
        );
    }

    #[test]
    fn parse_rfc3164_december_received_in_january_uses_previous_year() {
        let received = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 5).unwrap();
        let parsed = SyslogParser::new().parse("<13>Dec 31 23:59:59 h t: m", received);
        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap())
        );
    }

    #[test]
    fn parse_rfc3164_leap_day_received_after_leap_year() {
        let received = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        let parsed = SyslogParser::new().parse("<13>Feb 29 12:00:00 h t: m", received);
        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap())
        );
        assert_eq!(parsed.host.as_deref(), Some("h"));
    }

    #[test]
    fn parse_rfc3164_without_timestamp_keeps_tag() {
        let parsed = parse("<14>kernel: link up");
        assert_eq!(parsed.facility, Some(1));
        assert_eq!(parsed.timestamp, None);
        assert_eq!(parsed.host, None);
        assert_eq!(parsed.tag.as_deref(), Some("kernel"));
        assert_eq!(parsed.message, "link up");
        assert!(!parsed.well_formed);
    }

    #[test]
    fn parse_rfc3164_bad_timestamp_falls_back() {
        let parsed = parse("<134>Foo 99 99:99:99 host app: hello");
        assert_eq!(parsed.timestamp, None);
        assert_eq!(parsed.severity, Some(6));
        assert!(!parsed.well_formed);
    }

    #[test]
    fn parse_rfc5424_basic() {
        let parsed =
            parse("<34>1 2024-01-15T12:00:00Z myhost sshd 1234 - - Failed password for root");
        assert_eq!(parsed.facility, Some(4));
        assert_eq!(parsed.severity, Some(2));
        assert_eq!(parsed.host.as_deref(), Some("myhost"));
        assert_eq!(parsed.tag.as_deref(), Some("sshd"));
        assert_eq!(parsed.message, "Failed password for root");
        assert_eq!(
            parsed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
        );
        assert!(parsed.well_formed);
    }

    #[test]
    fn parse_rfc5424_with_timezone_and_structured_data() {
        let parsed = parse(
            "<165>1 2024-01-15T21:00:00.123+09:00 gw app - ID47 \
             [exampleSDID@32473 iut=\"3\" eventSource=\"App\\]\"][b x=\"1\"] \u{feff}An event",
        );
        assert_eq!(
            parsed.timestamp.map(|t| t.timestamp_millis()),
            Some(
                Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
                    .unwrap()
                    .timestamp_millis()
                    + 123
            )
        );
        assert_eq!(parsed.message, "An event");
    }

    #[test]
    fn parse_rfc5424_nilvalue_fields() {
        let parsed = parse("<13>1 - - - - - -");
        assert_eq!(parsed.timestamp, None);
        assert_eq!(parsed.host, None);
        assert_eq!(parsed.tag, None);
        assert_eq!(parsed.message, "");
        assert!(parsed.well_formed);
    }

    #[test]
    fn parse_rfc5424_missing_fields_keeps_pri() {
        let parsed = parse("<34>1 2024-01-15T12:00:00Z host");
        assert_eq!(parsed.facility, Some(4));
        assert_eq!(parsed.host, None);
        assert_eq!(parsed.message, "1 2024-01-15T12:00:00Z host");
        assert!(!parsed.well_formed);
    }

    #[test]
    fn missing_pri_degrades_to_raw_only() {
        let parsed = parse("just some text");
        assert_eq!(parsed, ParsedSyslog::raw_only("just some text"));
    }

    #[test]
    fn invalid_pri_values_degrade_to_raw_only() {
        for input in ["<192>x", "<-1>x", "<abc>x", "<>x", "<134", "<1344>x", ""] {
            let parsed = parse(input);
            assert_eq!(parsed.facility, None, "input {input:?}");
            assert_eq!(parsed.message, input, "input {input:?}");
            assert!(!parsed.well_formed);
        }
    }

    #[test]
    fn trailing_newline_is_stripped() {
        let parsed = parse("<134>Jan 1 00:00:00 host app: hello\n");
        assert_eq!(parsed.message, "hello");
    }

    #[test]
    fn multibyte_message_is_preserved() {
        let parsed = parse("<134>Jan 1 00:00:00 host app: 접속 허용 ✓");
        assert_eq!(parsed.message, "접속 허용 ✓");
    }
}
