//! Fuzz target for batch table parsing and column resolution.
//!
//! This fuzzer feeds arbitrary text to the batch table parser and resolves
//! the default column mapping, checking for panics, crashes, or hangs.

#![no_main]

use caseiter::{BatchTable, ColumnMapping};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(table) = BatchTable::from_csv_str(text) {
        let _ = table.resolve(&ColumnMapping::default());
    }
});
