//! Local directory blob store.
//!
//! Keys are `/`-separated paths relative to the root directory. Used for
//! local `--input-files`, mirror directories and tests.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use geo_harvester_core::io::{BlobInfo, BlobStore};

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|seg| seg == "..") {
            bail!("refusing key outside store root: {}", key);
        }
        Ok(self.root.join(key.trim_start_matches('/')))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || scan_directory(&root, &prefix))
            .await
            .context("directory scan task failed")?
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    fn describe(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}

fn scan_directory(root: &Path, prefix: &str) -> Result<Vec<BlobInfo>> {
    if !root.exists() {
        bail!("Input directory does not exist: {}", root.display());
    }

    let mut items = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !key.starts_with(prefix) {
            continue;
        }

        let metadata = entry.metadata()?;
        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        items.push(BlobInfo {
            key,
            last_modified,
            size: metadata.len(),
        });
    }

    // Sort for deterministic ordering
    items.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_list_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path());

        store.put("public/b.json", b"{}".to_vec()).await.unwrap();
        store.put("public/a.xml", b"<a/>".to_vec()).await.unwrap();
        store.put("other/c.txt", b"c".to_vec()).await.unwrap();

        let keys: Vec<_> = store
            .list("public/")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["public/a.xml", "public/b.json"]);
        assert_eq!(store.get("public/a.xml").await.unwrap(), b"<a/>");

        store.delete("public/a.xml").await.unwrap();
        store.delete("public/a.xml").await.unwrap();
        assert!(store.get("public/a.xml").await.is_err());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path().join("nope"));
        assert!(store.list("").await.is_err());
    }

    #[tokio::test]
    async fn parent_traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path());
        assert!(store.put("../escape.txt", vec![]).await.is_err());
    }
}
