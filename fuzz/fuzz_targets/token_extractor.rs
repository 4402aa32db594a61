#![no_main]

use lanwatch_inventory::TokenExtractor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(extractor) = TokenExtractor::new() else {
        return;
    };

    // 추출된 MAC은 예약 주소가 아니어야 하고 중복이 없어야 한다
    let macs = extractor.macs(text);
    for (i, mac) in macs.iter().enumerate() {
        assert!(!mac.is_unspecified_or_broadcast());
        assert!(!macs[i + 1..].contains(mac));
    }
    let _ = extractor.ipv4s(text);
});
