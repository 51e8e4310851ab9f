//! Fuzz target: history line parser
//!
//! Feeds arbitrary text to `HistoryEntry::parse_line` and verifies:
//! - No panics on any input, including non-ASCII and embedded commas
//! - Accepted lines always carry a 19-character timestamp and 4-character text
//!
//! cargo fuzz run fuzz_history_line

#![no_main]

use gms1000::history::HistoryEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for line in text.lines() {
        if let Some(entry) = HistoryEntry::parse_line(line) {
            assert_eq!(entry.ts.len(), 19);
            assert_eq!(entry.text.chars().count(), 4);
        }
    }
});
