//! In-memory collaborators for tests and local dry runs.
//!
//! State sits behind `std::sync::RwLock`/`Mutex`. A poisoned lock is
//! recovered rather than propagated; these types hold plain data with no
//! invariants a panicking writer could break.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{BlobInfo, BlobStore, EventPublisher, Queue, QueueMessage};

// ============ Blob store ============

struct StoredBlob {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Blob store over a sorted map. Keys listed in `fail_on` error on `get`;
/// `list` calls are counted.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
    failing: RwLock<BTreeSet<String>>,
    lists: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with an explicit modification time.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>, last_modified: DateTime<Utc>) {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), StoredBlob { bytes, last_modified });
    }

    /// Make every `get` of `key` fail.
    pub fn fail_on(&self, key: impl Into<String>) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }

    /// How many times `list` has been called.
    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Current bytes of `key`, if present.
    pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|b| b.bytes.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, b)| BlobInfo {
                key: k.clone(),
                last_modified: Some(b.last_modified),
                size: b.bytes.len() as u64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        if self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
        {
            bail!("simulated read failure for {}", key);
        }
        self.bytes(key)
            .ok_or_else(|| anyhow!("no such object: {}", key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.insert(key, bytes, Utc::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn describe(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

// ============ Queue ============

struct QueuedMessage {
    id: String,
    body: String,
    in_flight: bool,
    receives: u32,
}

/// FIFO queue with visibility semantics: a received message is hidden
/// until deleted or [`release_all`](MemoryQueue::release_all) is called.
pub struct MemoryQueue {
    name: String,
    messages: Mutex<Vec<QueuedMessage>>,
    next_id: Mutex<u64>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Enqueue a body and return its message id.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        *next += 1;
        let id = format!("msg-{}", *next);
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(QueuedMessage {
                id: id.clone(),
                body: body.into(),
                in_flight: false,
                receives: 0,
            });
        id
    }

    /// Make every in-flight message visible again.
    pub fn release_all(&self) {
        for m in self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
        {
            m.in_flight = false;
        }
    }

    /// Messages still held, visible or not.
    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn receipt_for(id: &str, receives: u32) -> String {
    format!("{}#{}", id, receives)
}

#[async_trait]
impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>> {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(messages
            .iter_mut()
            .filter(|m| !m.in_flight)
            .take(max)
            .map(|m| {
                m.in_flight = true;
                m.receives += 1;
                QueueMessage {
                    id: m.id.clone(),
                    receipt: receipt_for(&m.id, m.receives),
                    body: m.body.clone(),
                }
            })
            .collect())
    }

    async fn delete(&self, receipt: &str) -> Result<()> {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let before = messages.len();
        messages.retain(|m| receipt_for(&m.id, m.receives) != receipt);
        if messages.len() == before {
            bail!("receipt {} does not match any message in {}", receipt, self.name);
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(messages.iter().filter(|m| !m.in_flight).count() as u64)
    }
}

// ============ Publisher ============

/// Records every published event; optionally fails each publish.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, serde_json::Value)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish errors (after recording the attempt).
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, detail_type: &str, detail: serde_json::Value) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((detail_type.to_string(), detail));
        if self.fail {
            bail!("simulated publish failure");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn blob_list_respects_prefix() {
        let store = MemoryBlobStore::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.insert("geo/restricted/a.zip", b"a".to_vec(), t);
        store.insert("geo/restricted/b.zip", b"bb".to_vec(), t);
        store.insert("geo/public/a.zip", b"a".to_vec(), t);

        assert_eq!(store.list_calls(), 0);
        let listed = store.list("geo/restricted/").await.unwrap();
        assert_eq!(store.list_calls(), 1);
        let keys: Vec<_> = listed.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["geo/restricted/a.zip", "geo/restricted/b.zip"]);
        assert_eq!(listed[1].size, 2);

        store.delete("geo/public/a.zip").await.unwrap();
        store.delete("geo/public/a.zip").await.unwrap();
        assert!(!store.contains("geo/public/a.zip"));
    }

    #[tokio::test]
    async fn failing_keys_error_on_get() {
        let store = MemoryBlobStore::new();
        store.put("x", b"1".to_vec()).await.unwrap();
        store.fail_on("x");
        assert!(store.get("x").await.is_err());
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn received_messages_hide_until_deleted_or_released() {
        let q = MemoryQueue::new("geo-harvester-input");
        q.push("one");
        q.push("two");
        assert_eq!(q.pending_count().await.unwrap(), 2);

        let first = q.receive(1).await.unwrap();
        assert_eq!(first[0].body, "one");
        assert_eq!(q.pending_count().await.unwrap(), 1);

        let rest = q.receive(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(q.receive(10).await.unwrap().is_empty());

        q.delete(&first[0].receipt).await.unwrap();
        assert_eq!(q.len(), 1);

        q.release_all();
        let again = q.receive(10).await.unwrap();
        assert_eq!(again[0].body, "two");
        // the old receipt is stale after a redelivery
        assert!(q.delete(&rest[0].receipt).await.is_err());
        q.delete(&again[0].receipt).await.unwrap();
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn publisher_records_even_when_failing() {
        let p = RecordingPublisher::failing();
        assert!(p.publish("geo-harvester run", serde_json::json!({"a": 1})).await.is_err());
        assert_eq!(p.events().len(), 1);
    }
}
