#![no_main]

use libfuzzer_sys::fuzz_target;
use rpcwatch::record::{CsvRecordDecoder, RecordDecoder};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or fail, never panic
    if let Ok(call) = CsvRecordDecoder.decode(data) {
        let _ = call.epoch_minute();
        let _ = call.pair_key();
    }
});
