//! Input and output locations.
//!
//! Every `--input-files`, `--output-*-directory` and `--output-file` value
//! is either an `s3://bucket/prefix` URI or a local path:
//!
//! | Value | Store | Key prefix |
//! |-------|-------|------------|
//! | `s3://cdn/geo/public/` | [`S3BlobStore`] for `cdn` | `geo/public/` |
//! | `output/public` | [`LocalBlobStore`] at `output/public` | (none) |

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo_harvester_core::io::BlobStore;

use crate::aws::AwsCredentials;
use crate::config::AwsConfig;
use crate::fs_store::LocalBlobStore;
use crate::s3::S3BlobStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3 { bucket: String, prefix: String },
    Local(PathBuf),
}

impl Location {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            bail!("empty location");
        }
        match uri.strip_prefix("s3://") {
            Some(rest) => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    bail!("S3 location has no bucket: {}", uri);
                }
                Ok(Location::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                })
            }
            None => Ok(Location::Local(PathBuf::from(uri))),
        }
    }
}

/// A blob store plus the key prefix a location lives under.
#[derive(Clone)]
pub struct StoreRoot {
    pub store: Arc<dyn BlobStore>,
    pub prefix: String,
}

impl StoreRoot {
    pub fn new(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: directory_prefix(&prefix.into()),
        }
    }

    /// Open a directory-like location.
    pub fn open(uri: &str, aws: &AwsConfig) -> Result<Self> {
        match Location::parse(uri)? {
            Location::S3 { bucket, prefix } => {
                let store = S3BlobStore::new(bucket, aws, AwsCredentials::from_env()?);
                Ok(Self::new(Arc::new(store), prefix))
            }
            Location::Local(path) => Ok(Self::new(Arc::new(LocalBlobStore::new(path)), "")),
        }
    }

    /// Open a single-file location; returns the root and the file's key.
    pub fn open_file(uri: &str, aws: &AwsConfig) -> Result<(Self, String)> {
        match Location::parse(uri)? {
            Location::S3 { bucket, prefix } => {
                if prefix.is_empty() || prefix.ends_with('/') {
                    bail!("output file URI must name an object: {}", uri);
                }
                let store = S3BlobStore::new(bucket, aws, AwsCredentials::from_env()?);
                Ok((Self::new(Arc::new(store), ""), prefix))
            }
            Location::Local(path) => {
                let Some(name) = path.file_name() else {
                    bail!("output file path has no file name: {}", uri);
                };
                let parent = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let store = LocalBlobStore::new(parent);
                Ok((
                    Self::new(Arc::new(store), ""),
                    name.to_string_lossy().to_string(),
                ))
            }
        }
    }

    /// Key of `name` under this root.
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.trim_start_matches('/'))
    }

    pub fn describe(&self, name: &str) -> String {
        self.store.describe(&self.key(name))
    }
}

fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_harvester_core::io::memory::MemoryBlobStore;

    #[test]
    fn parses_s3_and_local() {
        assert_eq!(
            Location::parse("s3://cdn-origin/cdn/geo/public/").unwrap(),
            Location::S3 {
                bucket: "cdn-origin".into(),
                prefix: "cdn/geo/public/".into()
            }
        );
        assert_eq!(
            Location::parse("s3://bucket").unwrap(),
            Location::S3 {
                bucket: "bucket".into(),
                prefix: "".into()
            }
        );
        assert_eq!(
            Location::parse("output/public").unwrap(),
            Location::Local(PathBuf::from("output/public"))
        );
        assert!(Location::parse("s3:///x").is_err());
        assert!(Location::parse("  ").is_err());
    }

    #[test]
    fn keys_join_under_prefix() {
        let root = StoreRoot::new(Arc::new(MemoryBlobStore::new()), "/cdn/geo/public");
        assert_eq!(root.prefix, "cdn/geo/public/");
        assert_eq!(root.key("abc.zip"), "cdn/geo/public/abc.zip");

        let bare = StoreRoot::new(Arc::new(MemoryBlobStore::new()), "");
        assert_eq!(bare.key("/abc.zip"), "abc.zip");
    }

    #[test]
    fn local_output_file_splits_parent() {
        let (root, key) = StoreRoot::open_file("out/records.jsonl", &AwsConfig::default()).unwrap();
        assert_eq!(key, "records.jsonl");
        assert_eq!(root.prefix, "");
        let (_, key) = StoreRoot::open_file("records.jsonl", &AwsConfig::default()).unwrap();
        assert_eq!(key, "records.jsonl");
    }
}
