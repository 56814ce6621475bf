//! # Geo Harvester
//!
//! Harvests geospatial metadata from three origins, normalizes every record
//! into one canonical schema, and writes the results where a downstream
//! indexer and the public CDN can pick them up.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │  Providers   │──▶│  Harvester   │──▶│ Mirrors / JSONL    │
//! │ MIT/OGM/Alma │   │ fetch+norm.  │   │ S3 or local files  │
//! └──────┬───────┘   └──────┬───────┘   └────────────────────┘
//!        │                  │
//!   S3 · SQS · git          ▼
//!                    ┌──────────────┐
//!                    │ EventBridge  │
//!                    └──────────────┘
//! ```
//!
//! Pure logic (records, normalization, change-set contracts) lives in
//! `geo_harvester_core`; this crate supplies the I/O and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration plus environment overrides |
//! | [`aws`] | SigV4 request signing |
//! | [`s3`], [`fs_store`], [`storage`] | blob stores and `s3://` / local locations |
//! | [`sqs`] | SQS queue |
//! | [`eventbridge`] | EventBridge publisher |
//! | [`git`] | git command-line wrapper |
//! | [`provider_mit`], [`provider_ogm`], [`provider_alma`] | change-set providers |
//! | [`harvest`] | the per-record pipeline |
//! | [`report`] | run summary |

pub mod aws;
pub mod config;
pub mod eventbridge;
pub mod fs_store;
pub mod git;
pub mod harvest;
pub mod provider_alma;
pub mod provider_mit;
pub mod provider_ogm;
pub mod report;
pub mod s3;
pub mod sqs;
pub mod storage;
