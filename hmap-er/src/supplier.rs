//! Candidate supply and input loading
//!
//! The matcher core holds no cross-pair state. Everything that spans pairs
//! lives here: which listings belong to which local record, which candidates
//! were already seen, and which local records a previous run finished.

use crate::error::{MatchError, MatchResult};
use crate::types::{LocalHotelRecord, RemoteListingRecord};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source of candidate listings for a local record
#[async_trait::async_trait]
pub trait CandidateSupplier: Send + Sync {
    /// Candidates for one local record; an empty list is not an error
    ///
    /// # Errors
    /// Supplier-specific lookup failures (the runner logs and counts them)
    async fn candidates(&self, local: &LocalHotelRecord) -> MatchResult<Vec<RemoteListingRecord>>;

    /// A previous run already finished `local`; the runner skips it
    fn already_processed(&self, _local: &LocalHotelRecord) -> bool {
        false
    }

    /// Called once every verdict for `local` has been recorded, or once the
    /// supplier had no candidate for it
    async fn mark_done(&self, _local: &LocalHotelRecord) -> MatchResult<()> {
        Ok(())
    }
}

/// Append-only log of finished local codes, used to resume a run
#[derive(Debug)]
pub struct ProcessedLog {
    path: PathBuf,
    codes: Mutex<HashSet<String>>,
}

impl ProcessedLog {
    /// Open (or start) a log; existing codes are loaded
    pub fn open(path: impl Into<PathBuf>) -> MatchResult<Self> {
        let path = path.into();
        let codes: HashSet<String> = if path.exists() {
            std::fs::read_to_string(&path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        } else {
            HashSet::new()
        };

        tracing::info!(
            path = %path.display(),
            processed = codes.len(),
            "Processed-codes log opened"
        );

        Ok(Self {
            path,
            codes: Mutex::new(codes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes
            .lock()
            .map(|codes| codes.contains(code))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.codes.lock().map(|codes| codes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a code as finished (no-op if already logged)
    pub fn append(&self, code: &str) -> MatchResult<()> {
        let mut codes = self
            .codes
            .lock()
            .map_err(|_| MatchError::Io(std::io::Error::new(std::io::ErrorKind::Other, "processed log lock poisoned")))?;

        if codes.contains(code) {
            return Ok(());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", code)?;
        file.flush()?;
        codes.insert(code.to_string());
        Ok(())
    }
}

/// Candidate supplier backed by a JSON file of pre-scraped listings
///
/// File shape: `{ "<local code>": [ <RemoteListingRecord>, ... ], ... }`.
/// Candidates are returned in file order, duplicates (same URL) dropped, at
/// most `max_candidates` per local record.
pub struct ListingFileSupplier {
    listings: HashMap<String, Vec<RemoteListingRecord>>,
    max_candidates: usize,
    processed: Option<ProcessedLog>,
}

impl ListingFileSupplier {
    pub fn new(listings: HashMap<String, Vec<RemoteListingRecord>>, max_candidates: usize) -> Self {
        Self {
            listings,
            max_candidates,
            processed: None,
        }
    }

    /// Load listings from a JSON file
    ///
    /// # Errors
    /// File cannot be read or is not the expected JSON shape
    pub fn from_path(path: &Path, max_candidates: usize) -> MatchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let listings: HashMap<String, Vec<RemoteListingRecord>> = serde_json::from_str(&content)?;

        tracing::info!(
            path = %path.display(),
            locals = listings.len(),
            listings = listings.values().map(Vec::len).sum::<usize>(),
            "Listings loaded"
        );

        Ok(Self::new(listings, max_candidates))
    }

    /// Skip codes already in `log` and append codes as they finish
    pub fn with_processed_log(mut self, log: ProcessedLog) -> Self {
        self.processed = Some(log);
        self
    }

    pub fn processed_log(&self) -> Option<&ProcessedLog> {
        self.processed.as_ref()
    }
}

#[async_trait::async_trait]
impl CandidateSupplier for ListingFileSupplier {
    async fn candidates(&self, local: &LocalHotelRecord) -> MatchResult<Vec<RemoteListingRecord>> {
        let mut seen = HashSet::new();
        let candidates: Vec<RemoteListingRecord> = self
            .listings
            .get(&local.code)
            .map(|listings| {
                listings
                    .iter()
                    .filter(|l| seen.insert(l.url.clone()))
                    .take(self.max_candidates)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if candidates.is_empty() {
            tracing::debug!(code = %local.code, "No candidate listings");
        }
        Ok(candidates)
    }

    fn already_processed(&self, local: &LocalHotelRecord) -> bool {
        self.processed.as_ref().is_some_and(|log| log.contains(&local.code))
    }

    async fn mark_done(&self, local: &LocalHotelRecord) -> MatchResult<()> {
        match &self.processed {
            Some(log) => log.append(&local.code),
            None => Ok(()),
        }
    }
}

/// Read local hotel records from CSV
///
/// Expected headers: `code,name,country_code,area_name,latitude,longitude,
/// address,postal_code`. Rows without a code or that do not deserialize are
/// skipped with a warning; a repeated code keeps its first row. Coordinate
/// cells are read leniently, so a bad coordinate only makes geo unknown.
///
/// # Errors
/// File cannot be opened or read
pub fn load_local_records(path: &Path) -> MatchResult<Vec<LocalHotelRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for (index, row) in reader.deserialize::<LocalHotelRecord>().enumerate() {
        let record = match row {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(row = index + 1, error = %e, "Skipping unreadable local record");
                continue;
            }
        };
        if record.code.is_empty() {
            tracing::warn!(row = index + 1, "Skipping local record without code");
            continue;
        }
        if !seen.insert(record.code.clone()) {
            tracing::warn!(code = %record.code, "Duplicate local code, keeping first row");
            continue;
        }
        records.push(record);
    }

    tracing::info!(path = %path.display(), count = records.len(), "Local records loaded");
    Ok(records)
}

/// Read a code filter: one code per line, blank lines ignored
pub fn load_code_filter(path: &Path) -> MatchResult<HashSet<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Keep only records whose code is in `codes`, preserving order
pub fn apply_code_filter(records: Vec<LocalHotelRecord>, codes: &HashSet<String>) -> Vec<LocalHotelRecord> {
    let before = records.len();
    let kept: Vec<LocalHotelRecord> = records.into_iter().filter(|r| codes.contains(&r.code)).collect();
    tracing::info!(before = before, after = kept.len(), "Code filter applied");
    kept
}
