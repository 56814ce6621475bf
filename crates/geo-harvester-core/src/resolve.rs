//! Capability registry: which field resolvers apply to an (origin, format) pair.
//!
//! Field resolvers are plain functions keyed by canonical field name. They
//! are contributed by three layers, applied in order so that later layers
//! override earlier ones:
//!
//! ```text
//!   shared  ──▶  origin  ──▶  format
//!   (id, mdVersion,   (references,      (title, bbox, subjects, ...
//!    themes, ...)      provider)         everything content-shaped)
//! ```
//!
//! The format layer defines content semantics and therefore wins a conflict;
//! origins only supply context (landing pages, provider names) that a format
//! resolver may consult through [`ResolveContext`].
//!
//! [`CapabilityRegistry::new`] composes all fifteen pairs once. The result is
//! immutable and can be inspected without any source data, which is how the
//! composition is tested.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::formats;
use crate::marc::{self, MarcRecord};
use crate::origins;
use crate::record::{FieldValue, MetadataFormat, Origin, OriginContext, SourceRecord};
use crate::xml::{self, Element};

/// A single field failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("source document could not be parsed: {0}")]
    Document(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Could not determine external URL from source metadata")]
    NoExternalUrl,
    #[error("origin context missing: {0}")]
    MissingContext(&'static str),
}

pub type FieldResult = Result<Option<FieldValue>, FieldError>;

/// Computes one canonical field from a source record.
pub type Resolver = fn(&ResolveContext<'_>) -> FieldResult;

/// Which layer a resolver came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Shared,
    Origin,
    Format,
}

/// Run-wide values resolvers may need.
#[derive(Debug, Clone)]
pub struct ResolveEnv {
    /// Public HTTP root of the CDN serving mirrored files.
    pub http_cdn_root: String,
    /// Timestamp stamped into `gbl_mdModified_dt`.
    pub harvested_at: DateTime<Utc>,
}

impl ResolveEnv {
    pub fn new(http_cdn_root: impl Into<String>, harvested_at: DateTime<Utc>) -> Self {
        Self {
            http_cdn_root: http_cdn_root.into().trim_end_matches('/').to_string(),
            harvested_at,
        }
    }

    pub fn harvested_at_rfc3339(&self) -> String {
        self.harvested_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parsed documents
// ═══════════════════════════════════════════════════════════════════════

/// A source record's raw bytes, parsed once.
#[derive(Debug, Clone)]
pub enum Document {
    Xml(Element),
    Json(Map<String, Value>),
    Marc(MarcRecord),
}

impl Document {
    pub fn parse(format: MetadataFormat, raw: &[u8]) -> Result<Self, String> {
        match format {
            MetadataFormat::Fgdc | MetadataFormat::Iso19139 => {
                xml::parse(raw).map(Document::Xml).map_err(|e| e.to_string())
            }
            MetadataFormat::Marc => {
                let doc = xml::parse(raw).map_err(|e| e.to_string())?;
                marc::records(&doc)
                    .into_iter()
                    .next()
                    .map(Document::Marc)
                    .ok_or_else(|| "no MARC record found".to_string())
            }
            MetadataFormat::Gbl1 | MetadataFormat::Aardvark => {
                let mut value: Value = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
                // some repositories double-encode their records
                if let Value::String(inner) = &value {
                    value = serde_json::from_str(inner).map_err(|e| e.to_string())?;
                }
                match value {
                    Value::Object(map) => Ok(Document::Json(map)),
                    other => Err(format!("expected a JSON object, found {}", json_kind(&other))),
                }
            }
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Resolve context
// ═══════════════════════════════════════════════════════════════════════

/// Everything a resolver can see while computing one field.
pub struct ResolveContext<'a> {
    pub source: &'a SourceRecord,
    pub env: &'a ResolveEnv,
    document: Result<Document, String>,
    set: &'a ResolverSet,
}

impl<'a> ResolveContext<'a> {
    pub fn new(source: &'a SourceRecord, env: &'a ResolveEnv, set: &'a ResolverSet) -> Self {
        let document = Document::parse(source.format(), source.raw());
        Self {
            source,
            env,
            document,
            set,
        }
    }

    pub fn document_error(&self) -> Option<&str> {
        self.document.as_ref().err().map(String::as_str)
    }

    pub fn xml(&self) -> Result<&Element, FieldError> {
        match &self.document {
            Ok(Document::Xml(el)) => Ok(el),
            Ok(_) => Err(FieldError::Invalid("source is not an XML document".to_string())),
            Err(e) => Err(FieldError::Document(e.clone())),
        }
    }

    pub fn json(&self) -> Result<&Map<String, Value>, FieldError> {
        match &self.document {
            Ok(Document::Json(map)) => Ok(map),
            Ok(_) => Err(FieldError::Invalid("source is not a JSON document".to_string())),
            Err(e) => Err(FieldError::Document(e.clone())),
        }
    }

    pub fn marc(&self) -> Result<&MarcRecord, FieldError> {
        match &self.document {
            Ok(Document::Marc(rec)) => Ok(rec),
            Ok(_) => Err(FieldError::Invalid("source is not a MARC record".to_string())),
            Err(e) => Err(FieldError::Document(e.clone())),
        }
    }

    /// Resolve another field with the same resolver set.
    ///
    /// Returns `Ok(None)` when no resolver exists for `field`.
    pub fn value_of(&self, field: &str) -> FieldResult {
        match self.set.get(field) {
            Some(resolver) => resolver(self),
            None => Ok(None),
        }
    }

    /// Text list of another field, empty when absent or failing.
    pub fn list_of(&self, field: &str) -> Vec<String> {
        match self.value_of(field) {
            Ok(Some(FieldValue::TextList(v))) => v,
            Ok(Some(FieldValue::Text(s))) => vec![s],
            _ => Vec::new(),
        }
    }

    pub fn repository(&self) -> Option<(&str, Option<&crate::record::ExternalUrlStrategy>)> {
        match self.source.context() {
            OriginContext::Repository {
                name,
                external_url_strategy,
                ..
            } => Some((name.as_str(), external_url_strategy.as_ref())),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Resolver sets and the registry
// ═══════════════════════════════════════════════════════════════════════

/// The composed resolvers for one (origin, format) pair.
#[derive(Debug, Clone, Default)]
pub struct ResolverSet {
    resolvers: BTreeMap<&'static str, (Resolver, Layer)>,
}

impl ResolverSet {
    fn layer(&mut self, layer: Layer, contributions: Vec<(&'static str, Resolver)>) {
        for (name, resolver) in contributions {
            self.resolvers.insert(name, (resolver, layer));
        }
    }

    pub fn get(&self, field: &str) -> Option<Resolver> {
        self.resolvers.get(field).map(|(r, _)| *r)
    }

    /// Which layer supplies `field`, if any.
    pub fn provenance(&self, field: &str) -> Option<Layer> {
        self.resolvers.get(field).map(|(_, l)| *l)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resolvers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

/// Pairs that real harvests produce.
pub const SUPPORTED_PAIRS: &[(Origin, MetadataFormat)] = &[
    (Origin::Mit, MetadataFormat::Fgdc),
    (Origin::Mit, MetadataFormat::Iso19139),
    (Origin::Ogm, MetadataFormat::Fgdc),
    (Origin::Ogm, MetadataFormat::Iso19139),
    (Origin::Ogm, MetadataFormat::Gbl1),
    (Origin::Ogm, MetadataFormat::Aardvark),
    (Origin::Alma, MetadataFormat::Marc),
];

/// Immutable map of every (origin, format) pair to its composed resolvers.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    sets: HashMap<(Origin, MetadataFormat), ResolverSet>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        let mut sets = HashMap::new();
        for origin in Origin::ALL {
            for format in MetadataFormat::ALL {
                let mut set = ResolverSet::default();
                set.layer(Layer::Shared, origins::shared_resolvers());
                set.layer(Layer::Origin, origins::resolvers(origin));
                set.layer(Layer::Format, formats::resolvers(format));
                sets.insert((origin, format), set);
            }
        }
        Self { sets }
    }

    pub fn resolvers_for(&self, origin: Origin, format: MetadataFormat) -> &ResolverSet {
        // every pair is inserted in new()
        &self.sets[&(origin, format)]
    }

    pub fn is_supported(origin: Origin, format: MetadataFormat) -> bool {
        SUPPORTED_PAIRS.contains(&(origin, format))
    }

    pub fn pairs(&self) -> impl Iterator<Item = (Origin, MetadataFormat)> + '_ {
        self.sets.keys().copied()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn all_fifteen_pairs_are_composed() {
        let registry = CapabilityRegistry::new();
        assert_eq!(registry.pairs().count(), 15);
        for origin in Origin::ALL {
            for format in MetadataFormat::ALL {
                assert!(!registry.resolvers_for(origin, format).is_empty());
            }
        }
    }

    #[test]
    fn every_resolver_names_a_canonical_field() {
        let registry = CapabilityRegistry::new();
        for (origin, format) in registry.pairs() {
            for name in registry.resolvers_for(origin, format).field_names() {
                assert!(
                    schema::spec_for(name).is_some(),
                    "{}/{} resolves unknown field {}",
                    origin,
                    format,
                    name
                );
            }
        }
    }

    #[test]
    fn supported_pairs_supply_every_mandatory_field() {
        let registry = CapabilityRegistry::new();
        for &(origin, format) in SUPPORTED_PAIRS {
            let set = registry.resolvers_for(origin, format);
            for name in schema::required_fields() {
                assert!(set.get(name).is_some(), "{}/{} lacks {}", origin, format, name);
            }
        }
    }

    #[test]
    fn format_layer_wins_over_origin_layer() {
        let registry = CapabilityRegistry::new();
        // both the repository origin and the GBL1 format know about references;
        // the format's content-aware resolver must be the one used
        let set = registry.resolvers_for(Origin::Ogm, MetadataFormat::Gbl1);
        assert_eq!(set.provenance("dct_references_s"), Some(Layer::Format));
        assert_eq!(set.provenance("schema_provider_s"), Some(Layer::Origin));
        assert_eq!(set.provenance("id"), Some(Layer::Shared));

        let set = registry.resolvers_for(Origin::Mit, MetadataFormat::Fgdc);
        assert_eq!(set.provenance("dct_references_s"), Some(Layer::Origin));
        assert_eq!(set.provenance("dct_title_s"), Some(Layer::Format));
    }

    #[test]
    fn xml_formats_never_resolve_json_only_fields() {
        let registry = CapabilityRegistry::new();
        let fgdc = registry.resolvers_for(Origin::Mit, MetadataFormat::Fgdc);
        assert!(fgdc.get("gbl_wxsIdentifier_s").is_none());
        assert!(fgdc.get("dct_isPartOf_sm").is_none());
    }

    #[test]
    fn double_encoded_json_is_unwrapped() {
        let raw = serde_json::to_vec(&Value::String(r#"{"dc_title_s":"x"}"#.to_string())).unwrap();
        match Document::parse(MetadataFormat::Gbl1, &raw).unwrap() {
            Document::Json(map) => assert_eq!(map["dc_title_s"], "x"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Document::parse(MetadataFormat::Aardvark, b"[1]").is_err());
    }
}
