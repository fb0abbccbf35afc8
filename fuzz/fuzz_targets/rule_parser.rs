#![no_main]

use libfuzzer_sys::fuzz_target;
use rpcwatch::rules::parse_rules;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Multi-line input exercises line numbering and blank-line skipping
        let _ = parse_rules(input.lines());
    }
});
