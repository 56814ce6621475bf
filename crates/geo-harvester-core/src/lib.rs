//! # Geo Harvester Core
//!
//! Pure logic for Geo Harvester: the canonical record model, the
//! origin × format capability registry, the normalization engine, the
//! change-set contracts and the collaborator traits.
//!
//! Nothing in this crate touches the network or the filesystem. The
//! application crate supplies the I/O behind the [`io`] traits and the
//! [`changes::ChangeSetProvider`] implementations.
//!
//! | Module | Role |
//! |--------|------|
//! | [`schema`] | canonical field table |
//! | [`record`] | source and canonical records, validation |
//! | [`resolve`] | field resolvers and the capability registry |
//! | [`origins`], [`formats`] | the two capability axes |
//! | [`normalize`] | source record → canonical record |
//! | [`changes`] | change-set entries and the provider trait |
//! | [`io`] | blob store, queue and publisher contracts |

pub mod changes;
pub mod formats;
pub mod geometry;
pub mod io;
pub mod marc;
pub mod normalize;
pub mod origins;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod vocab;
pub mod xml;

pub use normalize::{Normalized, Normalizer, RecordError, Stage};
pub use record::{CanonicalRecord, FieldValue, HarvestEvent, MetadataFormat, Origin, SourceRecord};
pub use resolve::{CapabilityRegistry, ResolveEnv};
