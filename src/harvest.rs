//! Harvest orchestrator.
//!
//! ```text
//!   Start ─▶ Enumerate ─┬─▶ Fetch ─▶ Normalize ─▶ Decide ─▶ Write ─┐
//!                       │                                         │ (per entry)
//!                       ◀─────────────────────────────────────────┘
//!                       └─▶ output file ─▶ acknowledge ─▶ Notify ─▶ Report
//! ```
//!
//! Enumerate failures end the run with a [`HarvestError`]. Everything after
//! that is per record: a failure is attached to the record under its
//! [`Stage`], counted in the report, and the loop moves on.
//!
//! Write policy:
//!
//! | Output | Written when |
//! |--------|--------------|
//! | source mirror | the fetch succeeded |
//! | normalized mirror, output file | the record normalized and validated |
//!
//! Deleted entries remove their mirror objects instead of writing them, and
//! still contribute a (suppressed) line to the output file.

use anyhow::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use geo_harvester_core::changes::{
    ChangeSetEntry, ChangeSetProvider, DateWindow, HarvestMode, PreconditionError,
};
use geo_harvester_core::io::EventPublisher;
use geo_harvester_core::record::{normalized_metadata_filename, SourceRecord};
use geo_harvester_core::{Normalizer, Stage};

use crate::report::HarvestReport;
use crate::storage::{Location, StoreRoot};

/// EventBridge detail type of lifecycle notifications.
pub const EVENT_DETAIL_TYPE: &str = "geo-harvester run";

/// A run that could not get as far as processing records.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("harvest precondition failed: {0}")]
    Precondition(PreconditionError),
    #[error("harvest setup failed: {0:#}")]
    Setup(anyhow::Error),
}

impl HarvestError {
    fn from_enumerate(err: anyhow::Error) -> Self {
        match err.downcast_ref::<PreconditionError>() {
            Some(p) => HarvestError::Precondition(p.clone()),
            None => HarvestError::Setup(err),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Outputs
// ═══════════════════════════════════════════════════════════════════════

/// Publishes lifecycle notifications that point at the public CDN.
pub struct Notifier {
    publisher: Arc<dyn EventPublisher>,
    bucket: String,
    path: String,
}

impl Notifier {
    /// `public_root` is the public CDN root, e.g. `s3://cdn-origin/cdn/geo/public/`.
    pub fn new(publisher: Arc<dyn EventPublisher>, public_root: &str) -> Result<Self> {
        let (bucket, path) = match Location::parse(public_root)? {
            Location::S3 { bucket, prefix } => (bucket, prefix),
            Location::Local(dir) => (String::new(), dir.to_string_lossy().to_string()),
        };
        Ok(Self {
            publisher,
            bucket,
            path: path.trim_end_matches('/').to_string(),
        })
    }

    fn object_key(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    /// Event detail for one record. Flags are the strings `"true"` / `"false"`.
    pub fn detail(&self, source: &SourceRecord, restricted: bool) -> Value {
        let identifier = source.identifier();
        json!({
            "bucket": self.bucket,
            "identifier": identifier,
            "restricted": restricted.to_string(),
            "deleted": source.event().is_deleted().to_string(),
            "objects": [
                {"Key": self.object_key(&source.source_filename())},
                {"Key": self.object_key(&normalized_metadata_filename(identifier))},
                {"Key": self.object_key(&format!("{}.zip", identifier))},
            ],
        })
    }
}

/// A single combined output object.
pub struct OutputFile {
    pub root: StoreRoot,
    pub key: String,
}

/// Everything a run may write to, besides the report.
#[derive(Default)]
pub struct Outputs {
    pub source_mirror: Option<StoreRoot>,
    pub normalized_mirror: Option<StoreRoot>,
    pub output_file: Option<OutputFile>,
    pub notifier: Option<Notifier>,
}

// ═══════════════════════════════════════════════════════════════════════
// Run
// ═══════════════════════════════════════════════════════════════════════

/// What happened to one entry.
#[derive(Default)]
struct RecordOutcome {
    /// Canonical record as one JSON line, for the output file.
    line: Option<String>,
    notification: Option<Value>,
    failure: Option<(Stage, String)>,
}

pub struct Harvester {
    provider: Box<dyn ChangeSetProvider>,
    normalizer: Normalizer,
    outputs: Outputs,
}

impl Harvester {
    pub fn new(provider: Box<dyn ChangeSetProvider>, normalizer: Normalizer, outputs: Outputs) -> Self {
        Self {
            provider,
            normalizer,
            outputs,
        }
    }

    pub async fn run(&mut self, mode: HarvestMode, window: DateWindow) -> Result<HarvestReport, HarvestError> {
        let origin = self.provider.origin();
        let mut report = HarvestReport::new(origin, mode);
        info!(origin = %origin, mode = %mode, from = ?window.from, until = ?window.until, "harvest started");

        let entries = match self.provider.enumerate(mode, window).await {
            Ok(entries) => entries,
            Err(err) => {
                self.finish_provider().await;
                return Err(HarvestError::from_enumerate(err));
            }
        };
        if entries.is_empty() {
            info!(origin = %origin, "no changes to harvest");
            self.finish_provider().await;
            return Ok(report);
        }
        info!(count = entries.len(), "change set enumerated");

        let mut lines = String::new();
        let mut written: Vec<ChangeSetEntry> = Vec::new();
        let mut pooled: Vec<Value> = Vec::new();
        let mut pooled_index: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            let outcome = self.process(&entry).await;

            if let Some(detail) = outcome.notification {
                match pooled_index.get(&entry.identifier) {
                    Some(&i) => pooled[i] = detail,
                    None => {
                        pooled_index.insert(entry.identifier.clone(), pooled.len());
                        pooled.push(detail);
                    }
                }
            }

            match outcome.failure {
                Some((stage, reason)) => {
                    warn!(identifier = %entry.identifier, stage = %stage, reason = %reason, "record failed");
                    report.record_failure(&entry.identifier, stage, reason);
                }
                None => {
                    debug!(identifier = %entry.identifier, event = %entry.event, "record harvested");
                    report.record_success(&entry.identifier, entry.event.is_deleted());
                    if let Some(line) = outcome.line {
                        lines.push_str(&line);
                        lines.push('\n');
                    }
                    written.push(entry);
                }
            }
        }

        if let Some(out) = &self.outputs.output_file {
            let target = out.root.store.describe(&out.key);
            match out.root.store.put(&out.key, lines.into_bytes()).await {
                Ok(()) => info!(file = %target, records = written.len(), "output file written"),
                Err(e) => {
                    let reason = format!("output file {}: {:#}", target, e);
                    error!(reason = %reason, "could not write output file");
                    for entry in written.drain(..) {
                        report.demote_success(&entry.identifier, Stage::Write, &reason);
                    }
                }
            }
        }

        for entry in &written {
            if let Err(e) = self.provider.acknowledge(entry).await {
                warn!(identifier = %entry.identifier, error = %format!("{:#}", e), "could not acknowledge change");
            }
        }

        if let Some(notifier) = &self.outputs.notifier {
            for detail in pooled {
                let identifier = detail["identifier"].as_str().unwrap_or_default().to_string();
                match notifier.publisher.publish(EVENT_DETAIL_TYPE, detail).await {
                    Ok(()) => {
                        debug!(identifier = %identifier, "notification sent");
                        report.notifications_sent += 1;
                    }
                    Err(e) => {
                        error!(identifier = %identifier, error = %format!("{:#}", e), "error sending notification");
                        report.notification_failures += 1;
                    }
                }
            }
        }

        self.finish_provider().await;
        info!(
            processed = report.processed_records_count,
            succeeded = report.successful_records,
            failed = report.failed_records_count,
            "harvest finished"
        );
        Ok(report)
    }

    async fn finish_provider(&mut self) {
        if let Err(e) = self.provider.finish().await {
            warn!(error = %format!("{:#}", e), "provider cleanup failed");
        }
    }

    async fn process(&self, entry: &ChangeSetEntry) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();

        // ============ Fetch ============
        let source = match self.provider.fetch(entry).await {
            Ok(source) => source,
            Err(e) => {
                outcome.failure = Some((Stage::Fetch, format!("{:#}", e)));
                return outcome;
            }
        };

        // ============ Normalize ============
        let normalized = self.normalizer.normalize(&source);

        // ============ Decide ============
        let deleted = entry.event.is_deleted();
        if let Some(notifier) = &self.outputs.notifier {
            let restricted = normalized.record.is_restricted();
            outcome.notification = Some(notifier.detail(&source, restricted));
        }

        // ============ Write ============
        let source_name = source.source_filename();
        let normalized_name = normalized_metadata_filename(source.identifier());

        if deleted {
            for (mirror, name) in [
                (&self.outputs.source_mirror, &source_name),
                (&self.outputs.normalized_mirror, &normalized_name),
            ] {
                if let Some(mirror) = mirror {
                    if let Err(e) = mirror.store.delete(&mirror.key(name)).await {
                        outcome.failure = Some((
                            Stage::Write,
                            format!("removing {}: {:#}", mirror.describe(name), e),
                        ));
                        return outcome;
                    }
                }
            }
        } else if let Some(mirror) = &self.outputs.source_mirror {
            if let Err(e) = mirror
                .store
                .put(&mirror.key(&source_name), source.raw().to_vec())
                .await
            {
                outcome.failure = Some((
                    Stage::Write,
                    format!("writing {}: {:#}", mirror.describe(&source_name), e),
                ));
                return outcome;
            }
        }

        if let Some(stage) = normalized.failure_stage() {
            outcome.failure = Some((stage, normalized.error_summary()));
            return outcome;
        }

        let line = match normalized.record.to_json_string() {
            Ok(line) => line,
            Err(e) => {
                outcome.failure = Some((Stage::Write, format!("serializing record: {}", e)));
                return outcome;
            }
        };

        if !deleted {
            if let Some(mirror) = &self.outputs.normalized_mirror {
                if let Err(e) = mirror
                    .store
                    .put(&mirror.key(&normalized_name), line.clone().into_bytes())
                    .await
                {
                    outcome.failure = Some((
                        Stage::Write,
                        format!("writing {}: {:#}", mirror.describe(&normalized_name), e),
                    ));
                    return outcome;
                }
            }
        }

        outcome.line = Some(line);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_mit::MitProvider;
    use crate::provider_ogm::test_support::{config, fixture_repo, git_available, REPOSITORY};
    use crate::provider_ogm::OgmProvider;
    use chrono::{NaiveDate, TimeZone, Utc};
    use geo_harvester_core::io::memory::{MemoryBlobStore, MemoryQueue, RecordingPublisher};
    use geo_harvester_core::io::Queue;
    use geo_harvester_core::record::{repository_identifier, Origin};
    use geo_harvester_core::ResolveEnv;
    use std::io::{Cursor, Write};

    const FGDC: &str = r#"<metadata>
  <idinfo>
    <citation><citeinfo>
      <origin>Massachusetts GIS</origin>
      <origin>massachusetts gis</origin>
      <pubdate>2019</pubdate>
      <title>Town Boundaries</title>
      <geoform>vector digital data</geoform>
    </citeinfo></citation>
    <descript><abstract>Polygons of every town.</abstract><purpose>   </purpose></descript>
    <timeperd><timeinfo><rngdates><begdate>2017</begdate><enddate>2019</enddate></rngdates></timeinfo></timeperd>
    <spdom><bounding>
      <westbc>-73.5</westbc><eastbc>-69.9</eastbc><northbc>42.9</northbc><southbc>41.2</southbc>
    </bounding></spdom>
    <keywords>
      <theme><themekey>boundaries</themekey><themekey>towns</themekey></theme>
      <place><placekey>Massachusetts</placekey></place>
    </keywords>
    <accconst>None</accconst>
  </idinfo>
</metadata>"#;

    fn zip_with(name: &str, content: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut w = zip::ZipWriter::new(&mut buf);
            w.start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            w.write_all(content.as_bytes()).unwrap();
            w.finish().unwrap();
        }
        buf.into_inner()
    }

    fn message(detail_type: &str, key: &str) -> String {
        json!({
            "detail-type": detail_type,
            "time": "2024-03-01T12:00:00Z",
            "detail": {"bucket": {"name": "restricted"}, "object": {"key": key}}
        })
        .to_string()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(ResolveEnv::new(
            "https://cdn.example.org/geo",
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        ))
    }

    struct Fixture {
        archives: Arc<MemoryBlobStore>,
        public: Arc<MemoryBlobStore>,
        queue: Arc<MemoryQueue>,
        publisher: Arc<RecordingPublisher>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                archives: Arc::new(MemoryBlobStore::new()),
                public: Arc::new(MemoryBlobStore::new()),
                queue: Arc::new(MemoryQueue::new("geo-queue")),
                publisher: Arc::new(RecordingPublisher::new()),
            }
        }

        fn add_zip(&self, id: &str, metadata: &str) {
            self.archives.insert(
                format!("restricted/{}.zip", id),
                zip_with(&format!("{}/{}.xml", id, id), metadata),
                Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            );
        }

        fn harvester(&self) -> Harvester {
            let queue: Arc<dyn Queue> = self.queue.clone();
            let provider = MitProvider::new(StoreRoot::new(self.archives.clone(), "restricted"), Some(queue));
            let outputs = Outputs {
                source_mirror: Some(StoreRoot::new(self.public.clone(), "public")),
                normalized_mirror: Some(StoreRoot::new(self.public.clone(), "public")),
                output_file: Some(OutputFile {
                    root: StoreRoot::new(self.public.clone(), ""),
                    key: "records.jsonl".into(),
                }),
                notifier: Some(
                    Notifier::new(self.publisher.clone(), "s3://cdn-origin/cdn/geo/public/").unwrap(),
                ),
            };
            Harvester::new(Box::new(provider), normalizer(), outputs)
        }
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated_to_its_record() {
        let fx = Fixture::new();
        fx.add_zip("a", FGDC);
        fx.queue.push(message("Object Created", "a.zip"));
        fx.queue.push(message("Object Deleted", "b.zip"));

        let report = fx
            .harvester()
            .run(HarvestMode::Incremental, DateWindow::default())
            .await
            .unwrap();

        assert_eq!(report.processed_records_count, 2);
        assert_eq!(report.successful_records, 1);
        assert_eq!(report.failed_records_count, 1);
        assert_eq!(report.failed_by_stage.get(&Stage::Fetch), Some(&1));
        assert_eq!(report.to_index, vec!["a"]);
        assert!(report.to_delete.is_empty());

        let events = fx.publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, EVENT_DETAIL_TYPE);
        assert_eq!(events[0].1["identifier"], "a");
        assert_eq!(events[0].1["restricted"], "false");
        assert_eq!(events[0].1["deleted"], "false");
        assert_eq!(events[0].1["bucket"], "cdn-origin");
        assert_eq!(events[0].1["objects"][2]["Key"], "cdn/geo/public/a.zip");

        assert!(fx.public.contains("public/a.source.fgdc.xml"));
        assert!(fx.public.contains("public/a.normalized.aardvark.json"));

        // the written record's message is gone; the failed one comes back
        fx.queue.release_all();
        assert_eq!(fx.queue.len(), 1);
    }

    #[tokio::test]
    async fn full_mode_refuses_a_non_empty_queue() {
        let fx = Fixture::new();
        fx.add_zip("a", FGDC);
        fx.queue.push(message("Object Created", "a.zip"));

        let err = fx
            .harvester()
            .run(HarvestMode::Full, DateWindow::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Precondition(PreconditionError::QueueNotEmpty { count: 1, .. })
        ));
        assert_eq!(fx.archives.list_calls(), 0);
        assert!(fx.public.keys().is_empty());
        assert!(fx.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn invalid_records_still_mirror_source_bytes_and_notify() {
        let fx = Fixture::new();
        fx.add_zip("untitled", &FGDC.replace("<title>Town Boundaries</title>", ""));

        let report = fx
            .harvester()
            .run(HarvestMode::Full, DateWindow::default())
            .await
            .unwrap();
        assert_eq!(report.failed_by_stage.get(&Stage::Validate), Some(&1));
        assert!(report.to_index.is_empty());
        assert!(fx.public.contains("public/untitled.source.fgdc.xml"));
        assert!(!fx.public.contains("public/untitled.normalized.aardvark.json"));
        assert_eq!(fx.publisher.events().len(), 1);
        assert_eq!(fx.public.bytes("records.jsonl"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn reruns_write_identical_outputs() {
        let fx = Fixture::new();
        fx.add_zip("a", FGDC);
        fx.add_zip("c", &FGDC.replace("Town Boundaries", "County Boundaries"));

        let first = fx
            .harvester()
            .run(HarvestMode::Full, DateWindow::default())
            .await
            .unwrap();
        let first_lines = fx.public.bytes("records.jsonl").unwrap();
        let first_record = fx.public.bytes("public/a.normalized.aardvark.json").unwrap();

        let second = fx
            .harvester()
            .run(HarvestMode::Full, DateWindow::default())
            .await
            .unwrap();
        assert_eq!(first.to_index, second.to_index);
        assert_eq!(first.to_delete, second.to_delete);
        assert_eq!(fx.public.bytes("records.jsonl").unwrap(), first_lines);
        assert_eq!(
            fx.public.bytes("public/a.normalized.aardvark.json").unwrap(),
            first_record
        );
        assert_eq!(String::from_utf8(first_lines).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn deleted_records_clear_the_mirror() {
        let fx = Fixture::new();
        fx.add_zip("a", FGDC);
        fx.public.insert(
            "public/a.source.fgdc.xml",
            b"old".to_vec(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        fx.queue.push(message("Object Deleted", "a.zip"));

        let report = fx
            .harvester()
            .run(HarvestMode::Incremental, DateWindow::default())
            .await
            .unwrap();
        assert_eq!(report.to_delete, vec!["a"]);
        assert!(!fx.public.contains("public/a.source.fgdc.xml"));
        let lines = String::from_utf8(fx.public.bytes("records.jsonl").unwrap()).unwrap();
        let record: Value = serde_json::from_str(lines.trim()).unwrap();
        assert_eq!(record["gbl_suppressed_b"], true);
        assert_eq!(fx.publisher.events()[0].1["deleted"], "true");
    }

    #[tokio::test]
    async fn notification_failures_do_not_fail_records() {
        let mut fx = Fixture::new();
        fx.publisher = Arc::new(RecordingPublisher::failing());
        fx.add_zip("a", FGDC);

        let report = fx
            .harvester()
            .run(HarvestMode::Full, DateWindow::default())
            .await
            .unwrap();
        assert_eq!(report.successful_records, 1);
        assert_eq!(report.notification_failures, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[tokio::test]
    async fn empty_change_set_gives_zero_report() {
        let fx = Fixture::new();
        let report = fx
            .harvester()
            .run(HarvestMode::Incremental, DateWindow::default())
            .await
            .unwrap();
        assert_eq!(report.processed_records_count, 0);
        assert!(fx.public.keys().is_empty());
    }

    async fn ogm_incremental_run(remotes: &std::path::Path, out: &Arc<MemoryBlobStore>) -> HarvestReport {
        let scratch = tempfile::TempDir::new().unwrap();
        let provider = OgmProvider::new(&config(remotes, scratch.path()), &[], &[]).unwrap();
        let outputs = Outputs {
            normalized_mirror: Some(StoreRoot::new(out.clone(), "public")),
            output_file: Some(OutputFile {
                root: StoreRoot::new(out.clone(), ""),
                key: "ogm.jsonl".into(),
            }),
            ..Outputs::default()
        };
        let window = DateWindow::new(NaiveDate::from_ymd_opt(2023, 1, 1), None);
        Harvester::new(Box::new(provider), normalizer(), outputs)
            .run(HarvestMode::Incremental, window)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn repository_reruns_over_one_window_are_identical() {
        if !git_available() {
            return;
        }
        let remotes = tempfile::TempDir::new().unwrap();
        fixture_repo(remotes.path(), REPOSITORY);
        let out = Arc::new(MemoryBlobStore::new());

        let first = ogm_incremental_run(remotes.path(), &out).await;
        let first_lines = out.bytes("ogm.jsonl").unwrap();
        let second = ogm_incremental_run(remotes.path(), &out).await;

        let a = repository_identifier(REPOSITORY, "metadata-aardvark/x/a.json");
        let b = repository_identifier(REPOSITORY, "metadata-aardvark/x/b.json");
        assert_eq!(first.origin, Origin::Ogm);
        assert_eq!(first.processed_records_count, 2);
        assert_eq!(first.successful_records, 2);
        assert_eq!(first.to_index, vec![a.clone()]);
        assert_eq!(first.to_delete, vec![b.clone()]);
        assert_eq!(second.to_index, first.to_index);
        assert_eq!(second.to_delete, first.to_delete);
        assert_eq!(out.bytes("ogm.jsonl").unwrap(), first_lines);

        let lines = String::from_utf8(first_lines).unwrap();
        let records: Vec<Value> = lines.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 2);
        let revised = records.iter().find(|r| r["id"] == format!("ogm:{}", a)).unwrap();
        assert_eq!(revised["dct_title_s"], "Sheet A, revised");
        assert_eq!(revised["schema_provider_s"], REPOSITORY);
        let deleted = records.iter().find(|r| r["id"] == format!("ogm:{}", b)).unwrap();
        assert_eq!(deleted["dct_title_s"], "Sheet B");
        assert_eq!(deleted["gbl_suppressed_b"], true);

        assert!(out.contains(&format!("public/{}.normalized.aardvark.json", a)));
        assert!(!out.contains(&format!("public/{}.normalized.aardvark.json", b)));
    }
}
