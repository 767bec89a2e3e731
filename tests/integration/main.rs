//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock hardware. All tests run on the host (x86_64) with no
//! real hardware required.

mod mock_hw;
mod runner_tests;
mod uart_tests;
