//! Change sets: what to harvest, and where its bytes live.
//!
//! A [`ChangeSetProvider`] answers two questions for one origin:
//!
//! | Step | Method | Failure |
//! |------|--------|---------|
//! | which items changed? | [`enumerate`](ChangeSetProvider::enumerate) | fatal for the run |
//! | what are this item's bytes? | [`fetch`](ChangeSetProvider::fetch) | the one record fails at `fetch` |
//! | this item is durably written | [`acknowledge`](ChangeSetProvider::acknowledge) | logged |
//! | the run is over | [`finish`](ChangeSetProvider::finish) | logged |
//!
//! Entries live for one run only.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::record::{HarvestEvent, MetadataFormat, Origin, SourceRecord};

/// Full or incremental harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestMode {
    Full,
    Incremental,
}

impl HarvestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestMode::Full => "full",
            HarvestMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for HarvestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarvestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(HarvestMode::Full),
            "incremental" => Ok(HarvestMode::Incremental),
            other => Err(format!("unknown harvest type '{}' (expected full or incremental)", other)),
        }
    }
}

/// Half-open date window `[from, until)`, either end optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        Self { from, until }
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.until.map_or(true, |u| date < u)
    }

    /// Compare a timestamp against midnight UTC of each bound.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let midnight = |d: NaiveDate| d.and_time(NaiveTime::default()).and_utc();
        self.from.map_or(true, |f| at >= midnight(f)) && self.until.map_or(true, |u| at < midnight(u))
    }

    pub fn from_datetime(&self) -> Option<DateTime<Utc>> {
        self.from.map(|d| d.and_time(NaiveTime::default()).and_utc())
    }
}

/// Where one entry's raw bytes can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPointer {
    /// A whole object in a blob store.
    Blob { key: String },
    /// The metadata member of a zip package.
    ZipArchive { key: String },
    /// A file inside a cloned repository, at a commit or the working tree.
    GitFile {
        repository: String,
        path: String,
        commit: Option<String>,
    },
    /// Bytes already in hand, e.g. one record split out of an export.
    Inline {
        format: MetadataFormat,
        bytes: Vec<u8>,
        file: String,
    },
}

/// One item the provider believes changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetEntry {
    pub identifier: String,
    pub event: HarvestEvent,
    pub pointer: FetchPointer,
    /// Queue receipt to delete once the record is durably written.
    pub receipt: Option<String>,
}

impl ChangeSetEntry {
    pub fn new(identifier: impl Into<String>, event: HarvestEvent, pointer: FetchPointer) -> Self {
        Self {
            identifier: identifier.into(),
            event,
            pointer,
            receipt: None,
        }
    }

    pub fn with_receipt(mut self, receipt: impl Into<String>) -> Self {
        self.receipt = Some(receipt.into());
        self
    }
}

/// A run cannot start because upstream state is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("queue '{queue}' still holds {count} message(s); drain it with an incremental harvest before a full harvest")]
    QueueNotEmpty { queue: String, count: u64 },
    #[error("missing required setting: {0}")]
    MissingSetting(String),
    #[error("{0}")]
    InvalidWindow(String),
    #[error("no full export found under {0}")]
    NoFullExport(String),
}

/// Origin-specific discovery and fetch.
#[async_trait]
pub trait ChangeSetProvider: Send + Sync {
    fn origin(&self) -> Origin;

    /// List what changed. Errors here abort the run before any record is
    /// touched; a [`PreconditionError`] in the chain marks it as such.
    async fn enumerate(&mut self, mode: HarvestMode, window: DateWindow) -> Result<Vec<ChangeSetEntry>>;

    /// Read one entry's bytes into a source record.
    async fn fetch(&self, entry: &ChangeSetEntry) -> Result<SourceRecord>;

    /// The entry's record has been durably written.
    async fn acknowledge(&self, _entry: &ChangeSetEntry) -> Result<()> {
        Ok(())
    }

    /// Release run-scoped resources.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn window_is_half_open() {
        let w = DateWindow::new(Some(date("2024-01-01")), Some(date("2024-02-01")));
        assert!(w.contains_date(date("2024-01-01")));
        assert!(w.contains_date(date("2024-01-31")));
        assert!(!w.contains_date(date("2024-02-01")));
        assert!(!w.contains_date(date("2023-12-31")));
        assert!(w.contains(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()));
        assert!(!w.contains(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
        assert!(DateWindow::default().contains_date(date("1900-01-01")));
    }

    #[test]
    fn harvest_mode_parses() {
        assert_eq!("Full".parse::<HarvestMode>(), Ok(HarvestMode::Full));
        assert_eq!("incremental".parse::<HarvestMode>(), Ok(HarvestMode::Incremental));
        assert!("weekly".parse::<HarvestMode>().is_err());
    }

    #[test]
    fn precondition_is_recoverable_from_anyhow() {
        let err: anyhow::Error = PreconditionError::QueueNotEmpty {
            queue: "geo-harvester-input".into(),
            count: 3,
        }
        .into();
        let err = err.context("enumerating mit");
        assert!(err.downcast_ref::<PreconditionError>().is_some());
    }
}
