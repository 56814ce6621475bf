//! OpenGeoMetadata repositories.
//!
//! Each configured repository is cloned into a scratch directory for the
//! run. A full harvest takes every working-tree file whose
//! `<repo>/<path>` matches the repository's pattern; an incremental
//! harvest folds the commits made since `--from-date` into one event per
//! path, the last one winning.
//!
//! ```text
//!   A / M  ─▶ created / modified, bytes read at that commit
//!   D      ─▶ deleted, bytes read at the deleting commit's parent
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use geo_harvester_core::changes::{
    ChangeSetEntry, ChangeSetProvider, DateWindow, FetchPointer, HarvestMode, PreconditionError,
};
use geo_harvester_core::record::{
    repository_identifier, HarvestEvent, Origin, OriginContext, SourceRecord,
};

use crate::config::{OgmConfig, OgmRepositoryConfig};
use crate::git::{self, GitRepository};

/// Incremental harvests cannot reach further back than this.
const EARLIEST_FROM_DATE: (i32, u32, u32) = (1979, 1, 1);

struct Repository {
    name: String,
    config: OgmRepositoryConfig,
    pattern: Regex,
}

impl Repository {
    fn matches(&self, relative_path: &str) -> bool {
        self.pattern
            .is_match(&format!("{}/{}", self.name, relative_path))
    }
}

pub struct OgmProvider {
    clone_root_url: String,
    scratch: PathBuf,
    keep_clones: bool,
    repositories: Vec<Repository>,
    clones: HashMap<String, GitRepository>,
}

impl OgmProvider {
    /// Select repositories from config. `include` narrows to the named ones;
    /// `exclude` drops names.
    pub fn new(config: &OgmConfig, include: &[String], exclude: &[String]) -> Result<Self> {
        for name in include.iter().chain(exclude) {
            if !config.repositories.contains_key(name) {
                bail!("unknown OGM repository '{}'", name);
            }
        }

        let mut repositories = Vec::new();
        for (name, repo) in &config.repositories {
            if !include.is_empty() && !include.contains(name) {
                continue;
            }
            if exclude.contains(name) {
                continue;
            }
            let pattern = repo
                .file_pattern()
                .with_context(|| format!("repository '{}'", name))?;
            let pattern = Regex::new(&format!("^(?:{})", pattern))
                .with_context(|| format!("repository '{}' has an invalid pattern", name))?;
            repositories.push(Repository {
                name: name.clone(),
                config: repo.clone(),
                pattern,
            });
        }
        if repositories.is_empty() {
            bail!("no OGM repositories selected");
        }

        let run = format!(
            "run-{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            std::process::id()
        );
        Ok(Self {
            clone_root_url: config.clone_root_url.trim_end_matches('/').to_string(),
            scratch: config.clone_root_dir.join(run),
            keep_clones: config.keep_clones,
            repositories,
            clones: HashMap::new(),
        })
    }

    pub fn repository_names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }

    fn clone_all(&mut self) -> Result<()> {
        for repo in &self.repositories {
            if self.clones.contains_key(&repo.name) {
                continue;
            }
            let url = format!("{}/{}", self.clone_root_url, repo.name);
            let dest = self.scratch.join(&repo.name);
            info!(repository = %repo.name, url = %url, "cloning");
            let clone = git::clone(&url, &dest)?;
            self.clones.insert(repo.name.clone(), clone);
        }
        Ok(())
    }

    fn clone_of(&self, name: &str) -> Result<&GitRepository> {
        self.clones
            .get(name)
            .ok_or_else(|| anyhow!("repository '{}' was not cloned", name))
    }

    fn full(&self) -> Result<Vec<ChangeSetEntry>> {
        let mut entries = Vec::new();
        for repo in &self.repositories {
            let files = self.clone_of(&repo.name)?.working_files()?;
            let before = entries.len();
            for path in files.into_iter().filter(|p| repo.matches(p)) {
                entries.push(ChangeSetEntry::new(
                    repository_identifier(&repo.name, &path),
                    HarvestEvent::Created,
                    FetchPointer::GitFile {
                        repository: repo.name.clone(),
                        path,
                        commit: None,
                    },
                ));
            }
            info!(repository = %repo.name, count = entries.len() - before, "files matched");
        }
        Ok(entries)
    }

    fn incremental(&self, window: DateWindow) -> Result<Vec<ChangeSetEntry>> {
        let earliest = NaiveDate::from_ymd_opt(
            EARLIEST_FROM_DATE.0,
            EARLIEST_FROM_DATE.1,
            EARLIEST_FROM_DATE.2,
        )
        .ok_or_else(|| anyhow!("invalid earliest date"))?;
        let from = window.from.ok_or_else(|| {
            PreconditionError::InvalidWindow("incremental OGM harvest requires --from-date".into())
        })?;
        if from < earliest {
            return Err(PreconditionError::InvalidWindow(format!(
                "--from-date {} is before {}",
                from, earliest
            ))
            .into());
        }
        let since = from.and_time(NaiveTime::default()).and_utc();
        let until = window
            .until
            .map(|d| d.and_time(NaiveTime::default()).and_utc());

        let mut entries = Vec::new();
        for repo in &self.repositories {
            let commits = self.clone_of(&repo.name)?.changes_since(since, until)?;

            // path → (event, commit to read at)
            let mut latest: BTreeMap<String, (HarvestEvent, String)> = BTreeMap::new();
            for commit in commits {
                for (status, path) in commit.changes {
                    match status {
                        'A' | 'C' => {
                            latest.insert(path, (HarvestEvent::Created, commit.sha.clone()));
                        }
                        'M' => {
                            latest.insert(path, (HarvestEvent::Modified, commit.sha.clone()));
                        }
                        'D' => match &commit.parent {
                            Some(parent) => {
                                latest.insert(path, (HarvestEvent::Deleted, parent.clone()));
                            }
                            None => warn!(path = %path, commit = %commit.sha, "deletion without parent commit"),
                        },
                        other => debug!(status = %other, path = %path, "change status not harvested"),
                    }
                }
            }

            let before = entries.len();
            for (path, (event, commit)) in latest {
                if !repo.matches(&path) {
                    continue;
                }
                entries.push(ChangeSetEntry::new(
                    repository_identifier(&repo.name, &path),
                    event,
                    FetchPointer::GitFile {
                        repository: repo.name.clone(),
                        path,
                        commit: Some(commit),
                    },
                ));
            }
            info!(repository = %repo.name, count = entries.len() - before, since = %from, "changed files");
        }
        Ok(entries)
    }
}

#[async_trait]
impl ChangeSetProvider for OgmProvider {
    fn origin(&self) -> Origin {
        Origin::Ogm
    }

    async fn enumerate(&mut self, mode: HarvestMode, window: DateWindow) -> Result<Vec<ChangeSetEntry>> {
        self.clone_all()?;
        match mode {
            HarvestMode::Full => self.full(),
            HarvestMode::Incremental => self.incremental(window),
        }
    }

    async fn fetch(&self, entry: &ChangeSetEntry) -> Result<SourceRecord> {
        let FetchPointer::GitFile {
            repository,
            path,
            commit,
        } = &entry.pointer
        else {
            return Err(anyhow!("unexpected pointer for a repository file: {:?}", entry.pointer));
        };
        let repo = self
            .repositories
            .iter()
            .find(|r| &r.name == repository)
            .ok_or_else(|| anyhow!("unknown OGM repository '{}'", repository))?;
        let clone = self.clone_of(repository)?;

        let bytes = match commit {
            Some(sha) => clone.show(sha, path)?,
            None => {
                let full = clone.path().join(path);
                tokio::fs::read(&full)
                    .await
                    .with_context(|| format!("Failed to read {}", full.display()))?
            }
        };

        Ok(SourceRecord::new(
            entry.identifier.clone(),
            Origin::Ogm,
            repo.config.metadata_format,
            entry.event,
            bytes,
            OriginContext::Repository {
                name: repository.clone(),
                path: path.clone(),
                commit: commit.clone(),
                external_url_strategy: repo.config.external_url_strategy.clone(),
            },
        ))
    }

    async fn finish(&mut self) -> Result<()> {
        self.clones.clear();
        if self.keep_clones || !self.scratch.exists() {
            return Ok(());
        }
        tokio::fs::remove_dir_all(&self.scratch)
            .await
            .with_context(|| format!("Failed to remove clones at {}", self.scratch.display()))
    }
}

/// Fixture repositories shared by the provider and orchestrator tests.
#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{OgmConfig, OgmRepositoryConfig};
    use geo_harvester_core::record::MetadataFormat;
    use serde_json::json;
    use std::path::Path;
    use std::process::Command;

    pub(crate) const REPOSITORY: &str = "edu.example";

    pub(crate) fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    pub(crate) fn run_git(dir: &Path, args: &[&str], date: &str) {
        let status = Command::new("git")
            .args(["-c", "user.name=Harvest Test", "-c", "user.email=test@example.org"])
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    pub(crate) fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// A minimal Aardvark document that validates.
    pub(crate) fn aardvark(title: &str) -> String {
        json!({
            "dct_title_s": title,
            "dct_accessRights_s": "Public",
            "gbl_resourceClass_sm": ["Maps"],
            "dct_references_s": "{\"http://schema.org/url\":\"https://example.org/sheet\"}"
        })
        .to_string()
    }

    /// A repository with three commits:
    /// 2020: add a.json, b.json, README; 2023-06: modify a.json; 2023-07: delete b.json.
    pub(crate) fn fixture_repo(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        run_git(&dir, &["init", "--quiet"], "2020-01-01T00:00:00Z");
        write(&dir, "metadata-aardvark/x/a.json", &aardvark("Sheet A"));
        write(&dir, "metadata-aardvark/x/b.json", &aardvark("Sheet B"));
        write(&dir, "README.md", "readme");
        run_git(&dir, &["add", "-A"], "2020-01-01T00:00:00Z");
        run_git(&dir, &["commit", "--quiet", "-m", "initial"], "2020-01-01T00:00:00Z");

        write(&dir, "metadata-aardvark/x/a.json", &aardvark("Sheet A, revised"));
        run_git(&dir, &["commit", "--quiet", "-am", "modify a"], "2023-06-01T00:00:00Z");

        run_git(&dir, &["rm", "--quiet", "metadata-aardvark/x/b.json"], "2023-07-01T00:00:00Z");
        run_git(&dir, &["commit", "--quiet", "-m", "delete b"], "2023-07-01T00:00:00Z");
    }

    pub(crate) fn config(remotes: &Path, scratch: &Path) -> OgmConfig {
        let mut config = OgmConfig {
            clone_root_url: remotes.display().to_string(),
            clone_root_dir: scratch.to_path_buf(),
            ..OgmConfig::default()
        };
        config.repositories.insert(
            REPOSITORY.into(),
            OgmRepositoryConfig {
                metadata_format: MetadataFormat::Aardvark,
                filename_regex: None,
                file_directory: Some("metadata-aardvark".into()),
                external_url_strategy: None,
            },
        );
        config
    }
}
