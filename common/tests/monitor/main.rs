//! Integration tests for the monitor loop against mock peripherals.
//!
//! Each `mod` below maps to one file; all run on the host.

mod loop_tests;
mod mock_hw;
