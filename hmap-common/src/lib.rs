//! # HMAP Common Library
//!
//! Shared code for the HMAP hotel-mapping tools including:
//! - Common error type
//! - TOML configuration model and config-file resolution
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
