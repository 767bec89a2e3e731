//! Fuzz target: `LineAssembler::push`
//!
//! Drives arbitrary bytes through the line assembler with a fuzzed
//! terminator and filter setting. Every yielded line must be non-empty,
//! fit the line buffer, contain no terminator and, with the filter on,
//! only printable ASCII.
//!
//! cargo fuzz run fuzz_line_assembler

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::config::LINE_BUF_SIZE;
use sensornode::drivers::uart::LineAssembler;

fuzz_target!(|data: &[u8]| {
    let Some((&eol, rest)) = data.split_first() else {
        return;
    };
    let Some((&flags, bytes)) = rest.split_first() else {
        return;
    };
    let ascii_only = flags & 1 != 0;

    let mut lines = LineAssembler::new(eol);
    lines.set_ascii_only(ascii_only);

    for &byte in bytes {
        if let Some(line) = lines.push(byte) {
            assert!(!line.is_empty(), "assembler yielded an empty line");
            assert!(line.len() <= LINE_BUF_SIZE, "line exceeds buffer");
            assert!(!line.contains(&eol), "line contains its terminator");
            if ascii_only {
                assert!(line.iter().all(|b| (0x20..=0x7E).contains(b)));
            }
        }
    }

    // After a reset the assembler must accept bytes cleanly again.
    lines.reset();
    for &byte in bytes {
        let _ = lines.push(byte);
    }
});
