//! hmap-er library interface
//!
//! Decides whether a trusted local hotel record and a scraped listing describe
//! the same establishment.
//!
//! Pipeline per pair: [`normalizer`] → [`scorers`] → [`aggregator`] →
//! [`router`], orchestrated by [`session::MatchSession`]. The [`supplier`],
//! [`sink`] and [`runner`] modules are the batch plumbing around it.

pub mod aggregator;
pub mod arbiter;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod router;
pub mod runner;
pub mod scorers;
pub mod session;
pub mod sink;
pub mod supplier;
pub mod types;

pub use crate::config::MatcherConfig;
pub use crate::error::{MatchError, MatchResult};
pub use crate::session::MatchSession;
pub use crate::types::{
    Classification, Disposition, LocalHotelRecord, MatchEvidence, MatchVerdict, RemoteListingRecord,
    Resolution,
};
