#![no_main]

use chrono::{TimeZone, Utc};
use lanwatch_log_pipeline::parser::SyslogParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let parser = SyslogParser::new();
    let received_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let input = String::from_utf8_lossy(data);

    // 어떤 입력이든 패닉 없이 레코드를 만들어야 한다
    let parsed = parser.parse(&input, received_at);
    if let (Some(facility), Some(severity)) = (parsed.facility, parsed.severity) {
        assert!(facility <= 23);
        assert!(severity <= 7);
    }
});
