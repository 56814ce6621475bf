//! MIT GIS packages: zipped layers in the restricted CDN bucket.
//!
//! | Mode | Change set |
//! |------|------------|
//! | full | every `.zip` under the input location, filtered by last-modified |
//! | incremental | S3 event notifications drained from an SQS queue |
//!
//! A full harvest refuses to start while the queue still holds messages:
//! those are changes an incremental run has not processed yet.
//!
//! Each package carries its metadata inside the zip; ISO 19139 is preferred
//! over FGDC when both are present.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use serde_json::Value;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use geo_harvester_core::changes::{
    ChangeSetEntry, ChangeSetProvider, DateWindow, FetchPointer, HarvestMode, PreconditionError,
};
use geo_harvester_core::io::Queue;
use geo_harvester_core::record::{HarvestEvent, MetadataFormat, Origin, OriginContext, SourceRecord};

use crate::storage::StoreRoot;

// ═══════════════════════════════════════════════════════════════════════
// Queue messages
// ═══════════════════════════════════════════════════════════════════════

/// A queue message that cannot be turned into a change-set entry. The
/// message is left in the queue for manual handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageValidationError {
    #[error("message body is not JSON: {0}")]
    Body(String),
    #[error("message is missing '{0}'")]
    Missing(&'static str),
    #[error("message detail-type not recognized: {0}")]
    DetailType(String),
    #[error("file does not have a '.zip' extension: {0}")]
    NotZip(String),
    #[error("message time is not a timestamp: {0}")]
    Time(String),
}

/// An S3 object event for one zip package, as delivered by EventBridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipFileEvent {
    pub identifier: String,
    /// Object key relative to the restricted CDN root.
    pub key: String,
    pub bucket: String,
    pub event: HarvestEvent,
    pub time: DateTime<Utc>,
}

impl ZipFileEvent {
    pub fn parse(body: &str) -> Result<Self, MessageValidationError> {
        let v: Value =
            serde_json::from_str(body).map_err(|e| MessageValidationError::Body(e.to_string()))?;
        let text = |ptr: &'static str, name: &'static str| {
            v.pointer(ptr)
                .and_then(Value::as_str)
                .ok_or(MessageValidationError::Missing(name))
        };

        let event = match text("/detail-type", "detail-type")? {
            "Object Created" => HarvestEvent::Created,
            "Object Deleted" => HarvestEvent::Deleted,
            other => return Err(MessageValidationError::DetailType(other.to_string())),
        };
        let bucket = text("/detail/bucket/name", "detail.bucket.name")?.to_string();
        let key = text("/detail/object/key", "detail.object.key")?.to_string();
        let raw_time = text("/time", "time")?;
        let time = DateTime::parse_from_rfc3339(raw_time)
            .map_err(|_| MessageValidationError::Time(raw_time.to_string()))?
            .with_timezone(&Utc);
        let identifier = zip_identifier(&key).ok_or_else(|| MessageValidationError::NotZip(key.clone()))?;

        Ok(Self {
            identifier,
            key,
            bucket,
            event,
            time,
        })
    }
}

/// `cdn/geo/restricted/ABC_123.zip` → `ABC_123`.
fn zip_identifier(key: &str) -> Option<String> {
    let name = key.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if ext.trim().eq_ignore_ascii_case("zip") && !stem.is_empty() {
        Some(stem.to_string())
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Provider
// ═══════════════════════════════════════════════════════════════════════

pub struct MitProvider {
    archives: StoreRoot,
    queue: Option<Arc<dyn Queue>>,
    max_messages: usize,
    preserve_messages: bool,
}

impl MitProvider {
    /// `archives` is where zip packages live; queue message keys resolve
    /// against it too.
    pub fn new(archives: StoreRoot, queue: Option<Arc<dyn Queue>>) -> Self {
        Self {
            archives,
            queue,
            max_messages: 10,
            preserve_messages: false,
        }
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max.max(1);
        self
    }

    /// Leave messages in the queue after their records are written.
    pub fn preserve_messages(mut self, preserve: bool) -> Self {
        self.preserve_messages = preserve;
        self
    }

    async fn full(&self, window: DateWindow) -> Result<Vec<ChangeSetEntry>> {
        if let Some(queue) = &self.queue {
            let count = queue
                .pending_count()
                .await
                .with_context(|| format!("could not count messages in '{}'", queue.name()))?;
            if count > 0 {
                return Err(PreconditionError::QueueNotEmpty {
                    queue: queue.name().to_string(),
                    count,
                }
                .into());
            }
        }

        let listed = self.archives.store.list(&self.archives.prefix).await?;
        let mut entries = Vec::new();
        for blob in listed {
            let Some(identifier) = zip_identifier(&blob.key) else {
                continue;
            };
            let in_window = match blob.last_modified {
                Some(at) => window.contains(at),
                None => window.from.is_none() && window.until.is_none(),
            };
            if !in_window {
                continue;
            }
            entries.push(ChangeSetEntry::new(
                identifier,
                HarvestEvent::Created,
                FetchPointer::ZipArchive { key: blob.key },
            ));
        }
        info!(count = entries.len(), "zip packages listed for full harvest");
        Ok(entries)
    }

    async fn incremental(&self) -> Result<Vec<ChangeSetEntry>> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| PreconditionError::MissingSetting("GEOHARVESTER_SQS_TOPIC_NAME".into()))?;

        let mut entries = Vec::new();
        let mut invalid = 0usize;
        loop {
            let batch = queue.receive(self.max_messages).await?;
            if batch.is_empty() {
                break;
            }
            for message in batch {
                match ZipFileEvent::parse(&message.body) {
                    Ok(ev) => {
                        debug!(identifier = %ev.identifier, event = %ev.event, "queue message");
                        entries.push(
                            ChangeSetEntry::new(
                                ev.identifier,
                                ev.event,
                                FetchPointer::ZipArchive {
                                    key: self.archives.key(&ev.key),
                                },
                            )
                            .with_receipt(message.receipt),
                        );
                    }
                    Err(e) => {
                        invalid += 1;
                        error!(message_id = %message.id, error = %e, "invalid queue message, leaving it in the queue");
                    }
                }
            }
        }
        info!(count = entries.len(), invalid, queue = queue.name(), "queue drained");
        Ok(entries)
    }
}

#[async_trait]
impl ChangeSetProvider for MitProvider {
    fn origin(&self) -> Origin {
        Origin::Mit
    }

    async fn enumerate(&mut self, mode: HarvestMode, window: DateWindow) -> Result<Vec<ChangeSetEntry>> {
        match mode {
            HarvestMode::Full => self.full(window).await,
            HarvestMode::Incremental => self.incremental().await,
        }
    }

    async fn fetch(&self, entry: &ChangeSetEntry) -> Result<SourceRecord> {
        let FetchPointer::ZipArchive { key } = &entry.pointer else {
            return Err(anyhow!("unexpected pointer for a GIS package: {:?}", entry.pointer));
        };
        // TODO: read only the central directory and the metadata member via ranged GETs
        let bytes = self.archives.store.get(key).await?;
        let (format, metadata) = read_metadata_member(&entry.identifier, bytes)
            .with_context(|| format!("in {}", self.archives.store.describe(key)))?;
        debug!(identifier = %entry.identifier, format = %format, "metadata file located");

        Ok(SourceRecord::new(
            entry.identifier.clone(),
            Origin::Mit,
            format,
            entry.event,
            metadata,
            OriginContext::Archive {
                key: self.archives.store.describe(key),
            },
        ))
    }

    async fn acknowledge(&self, entry: &ChangeSetEntry) -> Result<()> {
        let (Some(queue), Some(receipt)) = (&self.queue, &entry.receipt) else {
            return Ok(());
        };
        if self.preserve_messages {
            debug!(identifier = %entry.identifier, "preserving queue message");
            return Ok(());
        }
        queue.delete(receipt).await
    }

    async fn finish(&mut self) -> Result<()> {
        if self.preserve_messages && self.queue.is_some() {
            warn!("queue messages were preserved; the next incremental run will see them again");
        }
        Ok(())
    }
}

// ============ Zip members ============

/// Find and read the metadata file of package `identifier`.
pub fn read_metadata_member(identifier: &str, zip_bytes: Vec<u8>) -> Result<(MetadataFormat, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).context("not a readable zip file")?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let (format, name) = find_metadata_member(identifier, &names)?
        .ok_or_else(|| anyhow!("Could not find ISO19139 or FGDC metadata file in zip file"))?;

    let mut file = archive.by_name(&name)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok((format, buf))
}

/// Member names are matched case-insensitively; `*.aux.xml` never matches.
fn find_metadata_member(identifier: &str, names: &[String]) -> Result<Option<(MetadataFormat, String)>> {
    let id = escape_glob(&identifier.to_lowercase());
    let preferred = [
        (MetadataFormat::Iso19139, format!("{}/*iso19139.xml", id)),
        (MetadataFormat::Iso19139, format!("{}*iso19139.xml", id)),
        (MetadataFormat::Fgdc, format!("{}/*.xml", id)),
        (MetadataFormat::Fgdc, format!("{}*.xml", id)),
    ];
    let skip = matcher("*.aux.xml")?;

    for (format, pattern) in &preferred {
        let m = matcher(pattern)?;
        for name in names {
            let lower = name.to_lowercase();
            if skip.is_match(&lower) {
                continue;
            }
            if m.is_match(&lower) {
                return Ok(Some((*format, name.clone())));
            }
        }
    }
    Ok(None)
}

fn matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)?.compile_matcher())
}

/// Bracket glob metacharacters so identifiers match literally.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' | '?' | '[' | ']' | '{' | '}' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}
