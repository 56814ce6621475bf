//! Configuration loading.
//!
//! Settings come from an optional TOML file, then deployment environment
//! variables are laid over it, then the result is validated.
//!
//! ```toml
//! workspace = "dev"
//!
//! [aws]
//! region = "us-east-1"
//! # s3_endpoint = "http://localhost:4566"   # LocalStack
//!
//! [cdn]
//! restricted_root = "s3://cdn-origin-dev/cdn/geo/restricted/"
//! public_root = "s3://cdn-origin-dev/cdn/geo/public/"
//!
//! [mit]
//! queue_name = "geo-harvester-input-dev"
//!
//! [ogm]
//! clone_root_url = "https://github.com/OpenGeoMetadata"
//!
//! [ogm.repositories."edu.stanford.purl"]
//! metadata_format = "aardvark"
//! file_directory = "metadata-aardvark"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `WORKSPACE` | `workspace` |
//! | `S3_RESTRICTED_CDN_ROOT` | `cdn.restricted_root` |
//! | `S3_PUBLIC_CDN_ROOT` | `cdn.public_root` |
//! | `GEOHARVESTER_SQS_TOPIC_NAME` | `mit.queue_name` |
//! | `AWS_REGION`, `AWS_DEFAULT_REGION` | `aws.region` |
//!
//! AWS credentials are read from the environment by [`crate::aws`], never
//! from the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo_harvester_core::changes::PreconditionError;
use geo_harvester_core::record::{ExternalUrlStrategy, MetadataFormat, Origin};
use geo_harvester_core::resolve::CapabilityRegistry;

pub const DEFAULT_CONFIG_PATH: &str = "./config/geoharvest.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    #[serde(default)]
    pub mit: MitConfig,
    #[serde(default)]
    pub ogm: OgmConfig,
    #[serde(default)]
    pub alma: AlmaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3 endpoint (MinIO, LocalStack). Path-style addressing is used
    /// when set.
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub sqs_endpoint: Option<String>,
    #[serde(default)]
    pub events_endpoint: Option<String>,
    #[serde(default = "default_event_bus")]
    pub event_bus_name: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            s3_endpoint: None,
            sqs_endpoint: None,
            events_endpoint: None,
            event_bus_name: default_event_bus(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_event_bus() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CdnConfig {
    /// Where zipped GIS packages live, e.g. `s3://bucket/cdn/geo/restricted/`.
    #[serde(default)]
    pub restricted_root: Option<String>,
    /// Public mirror root, e.g. `s3://bucket/cdn/geo/public/`.
    #[serde(default)]
    pub public_root: Option<String>,
    /// Base URL the CDN serves both roots under.
    #[serde(default = "default_http_root")]
    pub http_root: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            restricted_root: None,
            public_root: None,
            http_root: default_http_root(),
        }
    }
}

fn default_http_root() -> String {
    "https://cdn.dev.mitlibrary.net/geo".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MitConfig {
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u32,
}

impl Default for MitConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            max_messages: default_max_messages(),
            wait_seconds: default_wait_seconds(),
        }
    }
}

fn default_max_messages() -> usize {
    10
}
fn default_wait_seconds() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct OgmConfig {
    #[serde(default = "default_clone_root_url")]
    pub clone_root_url: String,
    /// Parent of the per-run scratch directories clones are made in.
    #[serde(default = "default_clone_root_dir")]
    pub clone_root_dir: PathBuf,
    /// Leave working copies on disk after the run.
    #[serde(default)]
    pub keep_clones: bool,
    #[serde(default)]
    pub repositories: BTreeMap<String, OgmRepositoryConfig>,
}

impl Default for OgmConfig {
    fn default() -> Self {
        Self {
            clone_root_url: default_clone_root_url(),
            clone_root_dir: default_clone_root_dir(),
            keep_clones: false,
            repositories: BTreeMap::new(),
        }
    }
}

fn default_clone_root_url() -> String {
    "https://github.com/OpenGeoMetadata".to_string()
}
fn default_clone_root_dir() -> PathBuf {
    PathBuf::from("output/ogm")
}

#[derive(Debug, Deserialize, Clone)]
pub struct OgmRepositoryConfig {
    pub metadata_format: MetadataFormat,
    #[serde(default)]
    pub filename_regex: Option<String>,
    #[serde(default)]
    pub file_directory: Option<String>,
    #[serde(default)]
    pub external_url_strategy: Option<ExternalUrlStrategy>,
}

impl OgmRepositoryConfig {
    /// Pattern a repository path (`<repo>/<relative path>`) must match from
    /// its start to be harvested.
    pub fn file_pattern(&self) -> Result<String> {
        match (&self.filename_regex, &self.file_directory) {
            (Some(_), Some(_)) => {
                bail!("only one of filename_regex and file_directory may be set")
            }
            (Some(re), None) => Ok(re.trim_end_matches('\n').to_string()),
            (None, Some(dir)) => Ok(format!(r".+?/{}/.+?\.json", dir)),
            (None, None) => bail!("one of filename_regex or file_directory is required"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlmaConfig {
    /// Default export location when `--input-files` is not given.
    #[serde(default)]
    pub input_files: Option<String>,
}

impl Config {
    /// Lay deployment environment variables over file settings.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(ws) = var("WORKSPACE") {
            self.workspace = Some(ws);
        }
        if let Some(root) = var("S3_RESTRICTED_CDN_ROOT") {
            self.cdn.restricted_root = Some(root);
        }
        if let Some(root) = var("S3_PUBLIC_CDN_ROOT") {
            self.cdn.public_root = Some(root);
        }
        if let Some(name) = var("GEOHARVESTER_SQS_TOPIC_NAME") {
            self.mit.queue_name = Some(name);
        }
        if let Some(region) = var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")) {
            self.aws.region = region;
        }
    }

    /// Both CDN roots, or the fatal precondition naming the missing one.
    pub fn require_cdn_roots(&self) -> Result<(&str, &str), PreconditionError> {
        let restricted = self
            .cdn
            .restricted_root
            .as_deref()
            .ok_or_else(|| PreconditionError::MissingSetting("S3_RESTRICTED_CDN_ROOT".into()))?;
        let public = self
            .cdn
            .public_root
            .as_deref()
            .ok_or_else(|| PreconditionError::MissingSetting("S3_PUBLIC_CDN_ROOT".into()))?;
        Ok((restricted, public))
    }
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG_PATH`] if it
/// exists, or defaults; then apply the process environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => read_file(p)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => read_file(Path::new(DEFAULT_CONFIG_PATH))?,
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok());
    validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    if config.aws.region.trim().is_empty() {
        bail!("aws.region must not be empty");
    }

    // SQS caps a single receive at 10 messages.
    if !(1..=10).contains(&config.mit.max_messages) {
        bail!("mit.max_messages must be in [1, 10]");
    }
    if config.mit.wait_seconds > 20 {
        bail!("mit.wait_seconds must be <= 20");
    }

    if !config.cdn.http_root.starts_with("http") {
        bail!("cdn.http_root must be an http(s) URL: '{}'", config.cdn.http_root);
    }

    for (name, repo) in &config.ogm.repositories {
        let pattern = repo
            .file_pattern()
            .with_context(|| format!("ogm.repositories.{}", name))?;
        regex::Regex::new(&pattern)
            .with_context(|| format!("ogm.repositories.{}: invalid file pattern", name))?;
        if !CapabilityRegistry::is_supported(Origin::Ogm, repo.metadata_format) {
            bail!(
                "ogm.repositories.{}: {} is not a repository format",
                name,
                repo.metadata_format
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[cdn]
public_root = "s3://cdn-origin/cdn/geo/public/"

[ogm.repositories."edu.stanford.purl"]
metadata_format = "aardvark"
file_directory = "metadata-aardvark"

[ogm.repositories."edu.nyu"]
metadata_format = "gbl1"
filename_regex = ".*geoblacklight.json$"
external_url_strategy = { name = "base_url_and_slug", base_url = "https://geo.nyu.edu/catalog" }
"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.aws.region, "us-east-1");
        assert_eq!(cfg.cdn.http_root, "https://cdn.dev.mitlibrary.net/geo");
        assert_eq!(cfg.mit.max_messages, 10);
        assert!(!cfg.ogm.keep_clones);
        assert_eq!(cfg.ogm.repositories.len(), 2);
        let nyu = &cfg.ogm.repositories["edu.nyu"];
        assert_eq!(nyu.metadata_format, MetadataFormat::Gbl1);
        assert_eq!(
            nyu.external_url_strategy.as_ref().unwrap().name,
            "base_url_and_slug"
        );
        validate(&cfg).unwrap();
    }

    #[test]
    fn environment_overrides_file() {
        let mut cfg = parse_config(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            ("S3_PUBLIC_CDN_ROOT", "s3://other/public/"),
            ("S3_RESTRICTED_CDN_ROOT", "s3://other/restricted/"),
            ("GEOHARVESTER_SQS_TOPIC_NAME", "geo-harvester-input-test"),
            ("AWS_DEFAULT_REGION", "us-west-2"),
            ("WORKSPACE", ""),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.cdn.public_root.as_deref(), Some("s3://other/public/"));
        assert_eq!(cfg.mit.queue_name.as_deref(), Some("geo-harvester-input-test"));
        assert_eq!(cfg.aws.region, "us-west-2");
        assert_eq!(cfg.workspace, None);
        assert!(cfg.require_cdn_roots().is_ok());
    }

    #[test]
    fn missing_cdn_root_is_a_precondition() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(
            cfg.require_cdn_roots(),
            Err(PreconditionError::MissingSetting("S3_RESTRICTED_CDN_ROOT".into()))
        );
    }

    #[test]
    fn repository_needs_exactly_one_filter() {
        let both = r#"
[ogm.repositories.x]
metadata_format = "fgdc"
filename_regex = ".*"
file_directory = "fgdc"
"#;
        assert!(validate(&parse_config(both).unwrap()).is_err());

        let neither = r#"
[ogm.repositories.x]
metadata_format = "fgdc"
"#;
        assert!(validate(&parse_config(neither).unwrap()).is_err());
    }

    #[test]
    fn marc_repositories_are_rejected() {
        let marc = r#"
[ogm.repositories.x]
metadata_format = "marc"
file_directory = "marc"
"#;
        let err = validate(&parse_config(marc).unwrap()).unwrap_err();
        assert!(err.to_string().contains("not a repository format"), "{}", err);
    }

    #[test]
    fn file_directory_becomes_json_pattern() {
        let cfg = parse_config(SAMPLE).unwrap();
        let pattern = cfg.ogm.repositories["edu.stanford.purl"].file_pattern().unwrap();
        assert_eq!(pattern, r".+?/metadata-aardvark/.+?\.json");
        let re = regex::Regex::new(&pattern).unwrap();
        assert!(re.is_match("edu.stanford.purl/metadata-aardvark/bb/123/geoblacklight.json"));
    }

    #[test]
    fn rejects_out_of_range_receive_size() {
        let cfg = parse_config("[mit]\nmax_messages = 50\n").unwrap();
        assert!(validate(&cfg).is_err());
    }
}
