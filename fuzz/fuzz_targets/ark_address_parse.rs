#![no_main]

use ark_contracts::ArkAddress;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(addr) = s.parse::<ArkAddress>() {
        let encoded = addr.encode().expect("decoded address must encode");
        assert_eq!(encoded, s.to_lowercase());
    }
    // With each network prefix in front, to get past the HRP check.
    let _ = format!("ark1{}", s).parse::<ArkAddress>();
    let _ = format!("tark1{}", s).parse::<ArkAddress>();
});
