#![no_main]

use chunkfilter::index::{hydrate_filter_index, PlainBackend};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Malformed snapshots hydrate leniently and never panic
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = hydrate_filter_index(&value, &PlainBackend, 4);
    }
});
