#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(rows) = stove_config::parse_trace(data) {
        assert!(!rows.is_empty());
        assert!(rows.windows(2).all(|w| w[0].seconds <= w[1].seconds));
    }
});
