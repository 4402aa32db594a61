#![no_main]

use lanwatch_core::types::MacAddress;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // 정규화된 표기는 다시 파싱해도 같은 주소가 된다
    if let Ok(mac) = MacAddress::parse(text) {
        let canonical = mac.to_string();
        assert_eq!(MacAddress::parse(&canonical).ok(), Some(mac));
    }
});
