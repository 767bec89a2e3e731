//! Fuzz target: `Reply::classify`
//!
//! Any byte string classifies without panicking. Blank input is `None`,
//! and data replies are always a trimmed, non-empty slice of the input.
//!
//! cargo fuzz run fuzz_reply_classify

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::ble::Reply;

fuzz_target!(|data: &[u8]| {
    match Reply::classify(data) {
        None => assert!(data.trim_ascii().is_empty()),
        Some(Reply::Data(line)) => {
            assert!(!line.is_empty());
            assert_eq!(line, line.trim_ascii());
        }
        Some(Reply::Ok | Reply::Error | Reply::Int(_)) => {}
    }
});
