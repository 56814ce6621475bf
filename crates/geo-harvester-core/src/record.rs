//! Source and canonical record types.
//!
//! A [`SourceRecord`] is what a change-set provider hands to the engine: raw
//! bytes tagged with where they came from ([`Origin`]) and how they are
//! encoded ([`MetadataFormat`]). A [`CanonicalRecord`] is what comes out: a
//! sparse map of canonical field names to typed values, serialized with
//! sorted keys and with absent fields omitted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::geometry;
use crate::schema::{self, FieldKind};

// ═══════════════════════════════════════════════════════════════════════
// Tags
// ═══════════════════════════════════════════════════════════════════════

/// Where a source record was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Internal file store of zipped GIS packages.
    Mit,
    /// Version-controlled repositories of metadata files.
    Ogm,
    /// Bulk MARC export from the library catalog.
    Alma,
}

impl Origin {
    pub const ALL: [Origin; 3] = [Origin::Mit, Origin::Ogm, Origin::Alma];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Mit => "mit",
            Origin::Ogm => "ogm",
            Origin::Alma => "alma",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of the raw source metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFormat {
    Fgdc,
    Iso19139,
    Gbl1,
    Aardvark,
    Marc,
}

impl MetadataFormat {
    pub const ALL: [MetadataFormat; 5] = [
        MetadataFormat::Fgdc,
        MetadataFormat::Iso19139,
        MetadataFormat::Gbl1,
        MetadataFormat::Aardvark,
        MetadataFormat::Marc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataFormat::Fgdc => "fgdc",
            MetadataFormat::Iso19139 => "iso19139",
            MetadataFormat::Gbl1 => "gbl1",
            MetadataFormat::Aardvark => "aardvark",
            MetadataFormat::Marc => "marc",
        }
    }

    /// File extension of the raw bytes.
    pub fn extension(&self) -> &'static str {
        if self.is_xml() {
            "xml"
        } else {
            "json"
        }
    }

    pub fn is_xml(&self) -> bool {
        matches!(
            self,
            MetadataFormat::Fgdc | MetadataFormat::Iso19139 | MetadataFormat::Marc
        )
    }
}

impl fmt::Display for MetadataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetadataFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metadata format: '{}'", s))
    }
}

/// What happened to the source item since the reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestEvent {
    Created,
    Modified,
    Deleted,
}

impl HarvestEvent {
    pub fn is_deleted(&self) -> bool {
        matches!(self, HarvestEvent::Deleted)
    }
}

impl fmt::Display for HarvestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HarvestEvent::Created => "created",
            HarvestEvent::Modified => "modified",
            HarvestEvent::Deleted => "deleted",
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Source records
// ═══════════════════════════════════════════════════════════════════════

/// How a repository record's external landing page is derived when the
/// record's own references do not carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrlStrategy {
    /// `base_url_and_slug` or `field_value`.
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub gbl1_field: Option<String>,
}

/// Origin-specific context a resolver may consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginContext {
    /// Key of the zip package holding the metadata.
    Archive { key: String },
    /// Repository name, path within it, and the commit the bytes were read at.
    Repository {
        name: String,
        path: String,
        commit: Option<String>,
        external_url_strategy: Option<ExternalUrlStrategy>,
    },
    /// Export file the record was read from.
    Export { file: String },
    None,
}

/// Raw metadata for one item, tagged by origin and format. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    identifier: String,
    origin: Origin,
    format: MetadataFormat,
    event: HarvestEvent,
    raw: Vec<u8>,
    context: OriginContext,
}

impl SourceRecord {
    pub fn new(
        identifier: impl Into<String>,
        origin: Origin,
        format: MetadataFormat,
        event: HarvestEvent,
        raw: Vec<u8>,
        context: OriginContext,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            origin,
            format,
            event,
            raw,
            context,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn format(&self) -> MetadataFormat {
        self.format
    }

    pub fn event(&self) -> HarvestEvent {
        self.event
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn context(&self) -> &OriginContext {
        &self.context
    }

    /// Mirror filename for the raw bytes.
    pub fn source_filename(&self) -> String {
        source_metadata_filename(&self.identifier, self.format)
    }
}

/// `<id>.source.<format>.<xml|json>`
pub fn source_metadata_filename(identifier: &str, format: MetadataFormat) -> String {
    format!(
        "{}.source.{}.{}",
        identifier,
        format.as_str(),
        format.extension()
    )
}

/// `<id>.normalized.aardvark.json`
pub fn normalized_metadata_filename(identifier: &str) -> String {
    format!("{}.normalized.aardvark.json", identifier)
}

/// Stable identifier for a file in a metadata repository:
/// `<repo>:<first 12 hex chars of sha256(path)>`.
pub fn repository_identifier(repository: &str, relative_path: &str) -> String {
    let digest = Sha256::digest(relative_path.as_bytes());
    format!("{}:{}", repository, &hex::encode(digest)[..12])
}

// ═══════════════════════════════════════════════════════════════════════
// Canonical records
// ═══════════════════════════════════════════════════════════════════════

/// A resolved canonical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
    TextList(Vec<String>),
    IntList(Vec<i64>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::TextList(items.into_iter().map(Into::into).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::TextList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "boolean",
            FieldValue::Text(_) => "string",
            FieldValue::TextList(_) => "list of strings",
            FieldValue::IntList(_) => "list of integers",
        }
    }
}

/// One reason a canonical record fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {reason}")]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A normalized record. Absent fields are simply missing from the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    /// Build a record from whatever fields resolved. Nothing is defaulted.
    pub fn construct<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `id` field, when resolved.
    pub fn id(&self) -> Option<&str> {
        self.text(schema::ID)
    }

    /// True when access rights are anything other than `Public`.
    pub fn is_restricted(&self) -> bool {
        self.text(schema::ACCESS_RIGHTS_FIELD) != Some("Public")
    }

    /// Check mandatory fields, kinds, vocabularies and formats.
    ///
    /// Violations are returned in schema order, followed by any fields the
    /// table does not know about. The record is never modified.
    pub fn validate(&self) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();

        for spec in schema::FIELDS {
            let Some(value) = self.fields.get(spec.name) else {
                if spec.required {
                    violations.push(Violation::new(spec.name, "required field is missing"));
                }
                continue;
            };
            check_value(spec, value, &mut violations);
        }

        for name in self.fields.keys() {
            if schema::spec_for(name).is_none() {
                violations.push(Violation::new(name, "not a canonical field"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Geometry strings that do not parse. These never fail validation.
    pub fn data_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for name in ["dcat_bbox", "locn_geometry"] {
            if let Some(value) = self.text(name) {
                if let Err(e) = geometry::check(value) {
                    warnings.push(format!("{}: {}", name, e));
                }
            }
        }
        warnings
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or_default()))
                .collect(),
        )
    }

    /// Compact JSON with sorted keys.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn check_value(spec: &schema::FieldSpec, value: &FieldValue, out: &mut Vec<Violation>) {
    let kind_ok = matches!(
        (spec.kind, value),
        (FieldKind::Text, FieldValue::Text(_))
            | (FieldKind::DateTime, FieldValue::Text(_))
            | (FieldKind::JsonObject, FieldValue::Text(_))
            | (FieldKind::TextList, FieldValue::TextList(_))
            | (FieldKind::Bool, FieldValue::Bool(_))
            | (FieldKind::IntList, FieldValue::IntList(_))
    );
    if !kind_ok {
        out.push(Violation::new(
            spec.name,
            format!("expected {:?}, found {}", spec.kind, value.kind_name()),
        ));
        return;
    }

    match (spec.kind, value) {
        (FieldKind::DateTime, FieldValue::Text(s)) => {
            if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                out.push(Violation::new(spec.name, format!("'{}' is not an RFC 3339 date-time", s)));
            }
        }
        (FieldKind::JsonObject, FieldValue::Text(s)) => {
            let is_object = serde_json::from_str::<serde_json::Value>(s)
                .map(|v| v.is_object())
                .unwrap_or(false);
            if !is_object {
                out.push(Violation::new(spec.name, "not a serialized JSON object"));
            }
        }
        _ => {}
    }

    if let Some(vocab) = spec.vocabulary {
        let values: Vec<&str> = match value {
            FieldValue::Text(s) => vec![s.as_str()],
            FieldValue::TextList(v) => v.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        for v in values {
            if !vocab.contains(&v) {
                out.push(Violation::new(
                    spec.name,
                    format!("'{}' is not one of {:?}", v, vocab),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_identifiers_are_stable_and_short() {
        let a = repository_identifier("edu.nyu", "metadata-1.0/nyu_2451_34564/geoblacklight.json");
        let b = repository_identifier("edu.nyu", "metadata-1.0/nyu_2451_34564/geoblacklight.json");
        assert_eq!(a, b);
        assert!(a.starts_with("edu.nyu:"));
        assert_eq!(a.len(), "edu.nyu:".len() + 12);
        assert_ne!(a, repository_identifier("edu.nyu", "metadata-1.0/other.json"));
    }

    fn minimal() -> CanonicalRecord {
        CanonicalRecord::construct([
            ("id", FieldValue::text("mit:abc")),
            ("dct_title_s", FieldValue::text("Roads")),
            ("gbl_resourceClass_sm", FieldValue::list(["Datasets"])),
            ("dct_accessRights_s", FieldValue::text("Public")),
            ("gbl_mdVersion_s", FieldValue::text("Aardvark")),
        ])
    }

    #[test]
    fn minimal_record_is_valid() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn each_missing_mandatory_field_is_reported() {
        for name in ["id", "dct_title_s", "gbl_resourceClass_sm", "dct_accessRights_s"] {
            let mut rec = minimal();
            rec.remove(name);
            let violations = rec.validate().unwrap_err();
            assert_eq!(violations.len(), 1, "{}", name);
            assert_eq!(violations[0].field, name);
        }
    }

    #[test]
    fn vocabulary_and_kind_violations() {
        let mut rec = minimal();
        rec.insert("gbl_resourceClass_sm", FieldValue::list(["Datasets", "Spreadsheets"]));
        rec.insert("gbl_suppressed_b", FieldValue::text("true"));
        rec.insert("gbl_mdModified_dt", FieldValue::text("yesterday"));
        rec.insert("dct_references_s", FieldValue::text("[1, 2]"));
        rec.insert("dc_title_s", FieldValue::text("legacy"));

        let violations = rec.validate().unwrap_err();
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "gbl_resourceClass_sm",
                "gbl_mdModified_dt",
                "dct_references_s",
                "gbl_suppressed_b",
                "dc_title_s"
            ]
        );
    }

    #[test]
    fn validate_does_not_mutate() {
        let mut rec = minimal();
        rec.insert("dct_accessRights_s", FieldValue::text("Secret"));
        let before = rec.clone();
        let _ = rec.validate();
        assert_eq!(rec, before);
    }

    #[test]
    fn serialization_is_sorted_and_sparse() {
        let rec = CanonicalRecord::construct([
            ("gbl_suppressed_b", FieldValue::Bool(false)),
            ("dct_title_s", FieldValue::text("T")),
            ("gbl_indexYear_im", FieldValue::IntList(vec![2001])),
        ]);
        let json = rec.to_json_string().unwrap();
        assert_eq!(
            json,
            r#"{"dct_title_s":"T","gbl_indexYear_im":[2001],"gbl_suppressed_b":false}"#
        );
        assert_eq!(json, rec.to_json_string().unwrap());
        assert_eq!(serde_json::to_string(&rec.to_json()).unwrap(), json);
    }

    #[test]
    fn restricted_unless_explicitly_public() {
        let mut rec = minimal();
        assert!(!rec.is_restricted());
        rec.insert("dct_accessRights_s", FieldValue::text("Restricted"));
        assert!(rec.is_restricted());
        rec.remove("dct_accessRights_s");
        assert!(rec.is_restricted());
    }

    #[test]
    fn output_filenames() {
        assert_eq!(
            source_metadata_filename("SDE_DATA_AE_A8GNS_2003", MetadataFormat::Fgdc),
            "SDE_DATA_AE_A8GNS_2003.source.fgdc.xml"
        );
        assert_eq!(
            source_metadata_filename("x", MetadataFormat::Gbl1),
            "x.source.gbl1.json"
        );
        assert_eq!(normalized_metadata_filename("x"), "x.normalized.aardvark.json");
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("ISO19139".parse::<MetadataFormat>(), Ok(MetadataFormat::Iso19139));
        assert!("dublin".parse::<MetadataFormat>().is_err());
    }
}
