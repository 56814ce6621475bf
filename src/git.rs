//! Thin wrapper over the `git` command line.
//!
//! Only what repository harvests need: clone, list working-tree files,
//! list commits with their name-status changes, and read a file at a commit.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

/// A local working copy.
#[derive(Debug, Clone)]
pub struct GitRepository {
    dir: PathBuf,
}

/// One commit and the files it touched, relative to its first parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitChanges {
    pub sha: String,
    pub parent: Option<String>,
    /// `(status letter, path)`, e.g. `('M', "metadata/a.json")`.
    pub changes: Vec<(char, String)>,
}

/// Full clone of `url` into `dest`, which must not exist yet.
pub fn clone(url: &str, dest: &Path) -> Result<GitRepository> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create clone directory: {}", parent.display()))?;
    }

    let output = Command::new("git")
        .args(["clone", "--quiet"])
        .arg(url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone of {} failed: {}", url, stderr.trim());
    }

    Ok(GitRepository::open(dest))
}

impl GitRepository {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .with_context(|| format!("Failed to execute 'git {}'", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(output.stdout)
    }

    /// Every file in the working tree outside `.git`, as `/`-separated
    /// paths relative to the repository root, sorted.
    pub fn working_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.dir).unwrap_or(entry.path());
            files.push(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
        files.sort();
        Ok(files)
    }

    /// Commits on HEAD made at or after `since` (and before `until`, when
    /// given), oldest first. Renames are reported as a delete plus an add.
    pub fn changes_since(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitChanges>> {
        let since_arg = format!("--since={}", since.to_rfc3339());
        let mut args = vec![
            "log".to_string(),
            "--reverse".to_string(),
            "--no-renames".to_string(),
            "--name-status".to_string(),
            "-z".to_string(),
            "--format=%x1e%H%x1f%P".to_string(),
            since_arg,
        ];
        if let Some(until) = until {
            args.push(format!("--until={}", until.to_rfc3339()));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.git(&args)?;
        Ok(parse_log(&String::from_utf8_lossy(&out)))
    }

    /// Raw bytes of `path` as of `commit`.
    pub fn show(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        let object = format!("{}:{}", commit, path);
        self.git(&["show", &object])
            .with_context(|| format!("could not read {} at {}", path, commit))
    }
}

/// Parse `git log -z --name-status --format=%x1e%H%x1f%P` output.
///
/// Each commit is `\x1e<sha>\x1f<parents>\0` followed by `<status>\0<path>\0`
/// pairs; the first status carries a leading newline. Paths come through
/// unquoted, so non-ASCII names, tabs and newlines survive.
fn parse_log(output: &str) -> Vec<CommitChanges> {
    output
        .split('\x1e')
        .filter(|chunk| !chunk.trim().is_empty())
        .filter_map(|chunk| {
            let mut fields = chunk.split('\0');
            let header = fields.next()?;
            let (sha, parents) = header.split_once('\x1f').unwrap_or((header, ""));

            let mut changes = Vec::new();
            while let Some(status) = fields.next() {
                let status = status.trim_start_matches('\n');
                let Some(letter) = status.chars().next() else {
                    continue;
                };
                let Some(path) = fields.next() else {
                    break;
                };
                changes.push((letter, path.to_string()));
            }
            Some(CommitChanges {
                sha: sha.trim().to_string(),
                parent: parents.split_whitespace().next().map(str::to_string),
                changes,
            })
        })
        .collect()
}
