//! Test Helper Utilities
//!
//! Shared utilities for testing hmap-er

#![allow(dead_code)]

pub mod fakes;
pub mod log_capture;

pub use fakes::*;
pub use log_capture::{init_test_logging, LogCapture};
