//! Alma MARC exports.
//!
//! The catalog drops MARC XML exports into one location, named like
//! `alma-2024-03-01-daily-extracted-records-to-index_19.xml`. The date and
//! the `full` / `daily` marker in the name drive selection:
//!
//! | Mode | Files read |
//! |------|-----------|
//! | full | every export dated on or after `--from-date`, which defaults to the latest full export |
//! | incremental | `daily` exports inside the window |
//!
//! Only geospatial records are harvested; leader/05 `d` marks a deletion.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use geo_harvester_core::changes::{
    ChangeSetEntry, ChangeSetProvider, DateWindow, FetchPointer, HarvestMode, PreconditionError,
};
use geo_harvester_core::marc;
use geo_harvester_core::record::{HarvestEvent, MetadataFormat, Origin, OriginContext, SourceRecord};
use geo_harvester_core::xml;

use crate::storage::StoreRoot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportKind {
    Full,
    Daily,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExportFile {
    key: String,
    date: NaiveDate,
    kind: Option<ExportKind>,
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"alma-(\d{4}-\d{2}-\d{2})-").expect("valid export date regex"))
}

impl ExportFile {
    fn parse(key: &str) -> Option<Self> {
        let name = key.rsplit('/').next().unwrap_or(key);
        let caps = date_regex().captures(name)?;
        let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
        let kind = if name.contains("full") {
            Some(ExportKind::Full)
        } else if name.contains("daily") {
            Some(ExportKind::Daily)
        } else {
            None
        };
        Some(Self {
            key: key.to_string(),
            date,
            kind,
        })
    }
}

/// Pick the export files a run reads, sorted by key.
fn select_files(
    mut files: Vec<ExportFile>,
    mode: HarvestMode,
    window: DateWindow,
    location: &str,
) -> Result<Vec<ExportFile>, PreconditionError> {
    files.sort_by(|a, b| a.key.cmp(&b.key));
    match mode {
        HarvestMode::Full => {
            let from = match window.from {
                Some(from) => from,
                None => files
                    .iter()
                    .filter(|f| f.kind == Some(ExportKind::Full))
                    .map(|f| f.date)
                    .max()
                    .ok_or_else(|| PreconditionError::NoFullExport(location.to_string()))?,
            };
            let window = DateWindow::new(Some(from), window.until);
            Ok(files
                .into_iter()
                .filter(|f| window.contains_date(f.date))
                .collect())
        }
        HarvestMode::Incremental => Ok(files
            .into_iter()
            .filter(|f| f.kind == Some(ExportKind::Daily) && window.contains_date(f.date))
            .collect()),
    }
}

pub struct AlmaProvider {
    input: StoreRoot,
}

impl AlmaProvider {
    pub fn new(input: StoreRoot) -> Self {
        Self { input }
    }

    async fn list_exports(&self) -> Result<Vec<ExportFile>> {
        let listed = self.input.store.list(&self.input.prefix).await?;
        let mut files = Vec::new();
        for blob in listed {
            if !blob.key.to_lowercase().ends_with(".xml") {
                continue;
            }
            match ExportFile::parse(&blob.key) {
                Some(file) => files.push(file),
                None => warn!(key = %blob.key, "could not parse date from export file name"),
            }
        }
        Ok(files)
    }

    /// Split one export into change-set entries for its geospatial records.
    async fn read_export(&self, file: &ExportFile) -> Result<Vec<ChangeSetEntry>> {
        let location = self.input.store.describe(&file.key);
        let bytes = self.input.store.get(&file.key).await?;
        let doc = xml::parse(&bytes).with_context(|| format!("could not parse {}", location))?;

        let mut scanned = 0usize;
        let mut entries = Vec::new();
        for record in marc::records(&doc) {
            scanned += 1;
            if !record.is_geospatial() {
                continue;
            }
            let Some(identifier) = record.control_number() else {
                warn!(file = %location, "geospatial record without 001 control number skipped");
                continue;
            };
            let event = if record.is_deleted() {
                HarvestEvent::Deleted
            } else {
                HarvestEvent::Created
            };
            entries.push(ChangeSetEntry::new(
                identifier,
                event,
                FetchPointer::Inline {
                    format: MetadataFormat::Marc,
                    bytes: record.to_xml().into_bytes(),
                    file: location.clone(),
                },
            ));
        }
        debug!(file = %location, scanned, geospatial = entries.len(), "export read");
        Ok(entries)
    }
}

#[async_trait]
impl ChangeSetProvider for AlmaProvider {
    fn origin(&self) -> Origin {
        Origin::Alma
    }

    async fn enumerate(&mut self, mode: HarvestMode, window: DateWindow) -> Result<Vec<ChangeSetEntry>> {
        let files = self.list_exports().await?;
        let location = self.input.store.describe(&self.input.prefix);
        let selected = select_files(files, mode, window, &location)?;
        info!(files = selected.len(), mode = %mode, "export files selected");

        let mut entries = Vec::new();
        for file in &selected {
            entries.extend(self.read_export(file).await?);
        }
        Ok(entries)
    }

    async fn fetch(&self, entry: &ChangeSetEntry) -> Result<SourceRecord> {
        let FetchPointer::Inline { format, bytes, file } = &entry.pointer else {
            return Err(anyhow!("unexpected pointer for an export record: {:?}", entry.pointer));
        };
        Ok(SourceRecord::new(
            entry.identifier.clone(),
            Origin::Alma,
            *format,
            entry.event,
            bytes.clone(),
            OriginContext::Export { file: file.clone() },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use geo_harvester_core::io::memory::MemoryBlobStore;
    use std::sync::Arc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn names(files: &[ExportFile]) -> Vec<&str> {
        files.iter().map(|f| f.key.as_str()).collect()
    }

    fn exports() -> Vec<ExportFile> {
        [
            "alma/alma-2024-01-01-full-extracted-records-to-index_1.xml",
            "alma/alma-2024-02-01-full-extracted-records-to-index_1.xml",
            "alma/alma-2024-01-15-daily-extracted-records-to-index_1.xml",
            "alma/alma-2024-02-02-daily-extracted-records-to-index_1.xml",
            "alma/alma-2024-02-03-daily-extracted-records-to-index_1.xml",
        ]
        .iter()
        .filter_map(|k| ExportFile::parse(k))
        .collect()
    }

    #[test]
    fn parses_export_names() {
        let f = ExportFile::parse("s3/alma/alma-2024-03-01-daily-extracted-records-to-index_19.xml").unwrap();
        assert_eq!(f.date, d("2024-03-01"));
        assert_eq!(f.kind, Some(ExportKind::Daily));
        assert!(ExportFile::parse("alma/readme.xml").is_none());
    }

    #[test]
    fn full_defaults_to_latest_full_export() {
        let selected = select_files(exports(), HarvestMode::Full, DateWindow::default(), "alma/").unwrap();
        assert_eq!(
            names(&selected),
            vec![
                "alma/alma-2024-02-01-full-extracted-records-to-index_1.xml",
                "alma/alma-2024-02-02-daily-extracted-records-to-index_1.xml",
                "alma/alma-2024-02-03-daily-extracted-records-to-index_1.xml",
            ]
        );
    }

    #[test]
    fn full_without_full_export_is_a_precondition() {
        let dailies: Vec<_> = exports()
            .into_iter()
            .filter(|f| f.kind == Some(ExportKind::Daily))
            .collect();
        let err = select_files(dailies, HarvestMode::Full, DateWindow::default(), "alma/").unwrap_err();
        assert_eq!(err, PreconditionError::NoFullExport("alma/".into()));
    }

    #[test]
    fn incremental_reads_dailies_in_window() {
        let window = DateWindow::new(Some(d("2024-02-01")), Some(d("2024-02-03")));
        let selected = select_files(exports(), HarvestMode::Incremental, window, "alma/").unwrap();
        assert_eq!(
            names(&selected),
            vec!["alma/alma-2024-02-02-daily-extracted-records-to-index_1.xml"]
        );
    }

    fn record(leader5: char, control: &str, geo: bool) -> String {
        let genre = if geo { "Maps." } else { "Novels." };
        format!(
            r#"<record>
  <leader>00000{leader5}em a2200000 i 4500</leader>
  <controlfield tag="001">{control}</controlfield>
  <datafield tag="245" ind1="1" ind2="0"><subfield code="a">Harbor chart</subfield></datafield>
  <datafield tag="655" ind1=" " ind2="7"><subfield code="a">{genre}</subfield></datafield>
  <datafield tag="949" ind1=" " ind2=" "><subfield code="k">MAP</subfield></datafield>
  <datafield tag="985" ind1=" " ind2=" "><subfield code="aa">MAPRM</subfield></datafield>
</record>"#
        )
    }

    #[tokio::test]
    async fn splits_geospatial_records_out_of_exports() {
        let store = Arc::new(MemoryBlobStore::new());
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let body = format!(
            r#"<collection xmlns="http://www.loc.gov/MARC21/slim">{}{}{}</collection>"#,
            record('c', "991", true),
            record('d', "992", true),
            record('c', "993", false),
        );
        store.insert(
            "alma/alma-2024-03-01-daily-extracted-records-to-index_1.xml",
            body.into_bytes(),
            at,
        );
        store.insert("alma/notes.txt", b"skip".to_vec(), at);

        let mut provider = AlmaProvider::new(StoreRoot::new(store, "alma"));
        let entries = provider
            .enumerate(HarvestMode::Incremental, DateWindow::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "991");
        assert_eq!(entries[0].event, HarvestEvent::Created);
        assert_eq!(entries[1].identifier, "992");
        assert_eq!(entries[1].event, HarvestEvent::Deleted);

        let source = provider.fetch(&entries[0]).await.unwrap();
        assert_eq!(source.format(), MetadataFormat::Marc);
        let text = String::from_utf8(source.raw().to_vec()).unwrap();
        assert!(text.contains("991"));
        assert!(!text.contains("992"));
    }
}
