//! 월별 파티션
//!
//! 스냅샷과 syslog 이벤트는 스트림별 월 단위 테이블에 저장됩니다.
//! 테이블 이름은 `{prefix}YYYYMM` 형식이며 범위는 `[월 시작, 다음 달 시작)`입니다.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// 파티션된 스트림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// 디바이스 스냅샷 (`device_snapshot_YYYYMM`)
    DeviceSnapshot,
    /// syslog 이벤트 (`syslog_event_YYYYMM`)
    SyslogEvent,
}

impl StreamKind {
    /// 모든 스트림
    pub const ALL: [StreamKind; 2] = [StreamKind::DeviceSnapshot, StreamKind::SyslogEvent];

    /// 테이블 이름 접두어
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::DeviceSnapshot => "device_snapshot_",
            Self::SyslogEvent => "syslog_event_",
        }
    }

    /// 파티션 기준 시각 컬럼
    pub fn time_column(&self) -> &'static str {
        match self {
            Self::DeviceSnapshot => "sampled_at",
            Self::SyslogEvent => "received_at",
        }
    }

    /// 메트릭/로그용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceSnapshot => "snapshot",
            Self::SyslogEvent => "syslog",
        }
    }

    /// 파티션의 테이블 이름
    pub fn table_name(&self, partition: MonthPartition) -> String {
        format!("{}{}", self.prefix(), partition.suffix())
    }

    /// 테이블 이름에서 파티션을 추출합니다.
    pub fn parse_table(&self, table: &str) -> Option<MonthPartition> {
        table
            .strip_prefix(self.prefix())
            .and_then(MonthPartition::parse_suffix)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 한 달 범위의 파티션
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPartition {
    year: i32,
    month: u32,
}

impl MonthPartition {
    /// 연/월로 생성합니다. 범위를 벗어나면 `None`입니다.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    /// 시각이 속한 파티션
    pub fn containing(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// 다음 달
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// 이전 달
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// 범위 시작 (포함)
    pub fn start(&self) -> DateTime<Utc> {
        month_start(self.year, self.month)
    }

    /// 범위 끝 (제외) = 다음 달 시작
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// 범위 전체가 `cutoff` 이전인지 확인합니다.
    pub fn is_entirely_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.end() <= cutoff
    }

    /// `[from, to)` 구간과 겹치는지 확인합니다.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start() < to && from < self.end()
    }

    /// 테이블 이름 접미어 (`YYYYMM`)
    pub fn suffix(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    /// `YYYYMM` 접미어를 파싱합니다.
    pub fn parse_suffix(suffix: &str) -> Option<Self> {
        if suffix.len() != 6 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = suffix[..4].parse().ok()?;
        let month = suffix[4..].parse().ok()?;
        Self::new(year, month)
    }
}

impl fmt::Display for MonthPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
