//! Normalization engine: one source record in, one canonical record out.
//!
//! ```text
//!   SourceRecord ──▶ for each canonical field, in schema order
//!                      │  resolver?  no  ─▶ skip
//!                      │             yes ─▶ value | absent | FieldError
//!                      ▼
//!                   tidy values (blank → absent, dedupe lists)
//!                      ▼
//!                   validate ─▶ Violations (record-level)
//! ```
//!
//! A failing field never stops the others. The outcome always carries the
//! canonical record built from whatever resolved, plus every error seen.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::{CanonicalRecord, FieldValue, SourceRecord, Violation};
use crate::resolve::{CapabilityRegistry, FieldError, ResolveContext, ResolveEnv};
use crate::schema;

/// Where in a record's life a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Normalize,
    Validate,
    Write,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Validate => "validate",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem found while normalizing one record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// The raw bytes could not be parsed at all.
    #[error("source document could not be parsed: {0}")]
    Document(String),
    #[error("field {field}: {error}")]
    Field { field: String, error: FieldError },
    #[error("record failed validation: {}", join_violations(.0))]
    Invalid(Vec<Violation>),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of normalizing one source record.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: CanonicalRecord,
    pub errors: Vec<RecordError>,
    /// Data-quality notes that never fail the record.
    pub warnings: Vec<String>,
}

impl Normalized {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fields whose resolvers failed, in schema order.
    pub fn failed_fields(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                RecordError::Field { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The stage a failed record is reported under.
    ///
    /// Any field or document error fails at `normalize`; a record whose
    /// fields all resolved but that does not validate fails at `validate`.
    pub fn failure_stage(&self) -> Option<Stage> {
        if self.errors.is_empty() {
            None
        } else if self
            .errors
            .iter()
            .any(|e| !matches!(e, RecordError::Invalid(_)))
        {
            Some(Stage::Normalize)
        } else {
            Some(Stage::Validate)
        }
    }

    /// Every error as one line of text.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(RecordError::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Normalizes source records with a fixed registry and run environment.
#[derive(Debug, Clone)]
pub struct Normalizer {
    registry: CapabilityRegistry,
    env: ResolveEnv,
}

impl Normalizer {
    pub fn new(env: ResolveEnv) -> Self {
        Self::with_registry(CapabilityRegistry::new(), env)
    }

    pub fn with_registry(registry: CapabilityRegistry, env: ResolveEnv) -> Self {
        Self { registry, env }
    }

    pub fn env(&self) -> &ResolveEnv {
        &self.env
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn normalize(&self, source: &SourceRecord) -> Normalized {
        let set = self.registry.resolvers_for(source.origin(), source.format());
        let ctx = ResolveContext::new(source, &self.env, set);

        let mut record = CanonicalRecord::default();
        let mut errors = Vec::new();

        if let Some(e) = ctx.document_error() {
            errors.push(RecordError::Document(e.to_string()));
        }

        for spec in schema::FIELDS {
            let Some(resolver) = set.get(spec.name) else {
                continue;
            };
            match resolver(&ctx) {
                Ok(Some(value)) => {
                    if let Some(value) = tidy(value) {
                        record.insert(spec.name, value);
                    }
                }
                Ok(None) => {}
                // already reported once for the whole record
                Err(FieldError::Document(_)) => {}
                Err(error) => {
                    debug!(
                        identifier = source.identifier(),
                        field = spec.name,
                        error = %error,
                        "field failed to resolve"
                    );
                    errors.push(RecordError::Field {
                        field: spec.name.to_string(),
                        error,
                    });
                }
            }
        }

        if let Err(violations) = record.validate() {
            errors.push(RecordError::Invalid(violations));
        }

        let warnings = record.data_warnings();
        for w in &warnings {
            warn!(identifier = source.identifier(), warning = %w, "data quality");
        }

        Normalized {
            record,
            errors,
            warnings,
        }
    }
}

/// Drop blanks and duplicates; `None` when nothing is left.
fn tidy(value: FieldValue) -> Option<FieldValue> {
    match value {
        FieldValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(FieldValue::Text(trimmed.to_string()))
            }
        }
        FieldValue::TextList(items) => {
            let items = dedupe_case_insensitive(items);
            (!items.is_empty()).then_some(FieldValue::TextList(items))
        }
        FieldValue::IntList(years) => (!years.is_empty()).then_some(FieldValue::IntList(years)),
        FieldValue::Bool(b) => Some(FieldValue::Bool(b)),
    }
}

/// Keeps each value at its first position, spelled as its last occurrence.
fn dedupe_case_insensitive(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<(String, String)> = Vec::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = trimmed.to_string(),
            None => out.push((key, trimmed.to_string())),
        }
    }
    out.into_iter().map(|(_, v)| v).collect()
}
