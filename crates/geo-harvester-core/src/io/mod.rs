//! Collaborator contracts.
//!
//! The orchestrator and providers talk to the outside world only through
//! these traits. Real implementations (S3, SQS, EventBridge, local files)
//! live in the application crate; [`memory`] holds in-process ones for
//! tests and dry runs.
//!
//! | Trait | Operations |
//! |-------|------------|
//! | [`BlobStore`] | `list`, `get`, `put`, `delete` |
//! | [`Queue`] | `receive`, `delete`, `pending_count` |
//! | [`EventPublisher`] | `publish` |
//!
//! Implementations own their retry and timeout policy.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

/// Key-value object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Objects whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or overwrite.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Human-readable location of `key`, for logs and reports.
    fn describe(&self, key: &str) -> String {
        key.to_string()
    }
}

/// A received queue message. `receipt` is what deletes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub receipt: String,
    pub body: String,
}

/// A pull queue with explicit deletes.
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `max` messages. Received messages stay in the queue until deleted.
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>>;

    async fn delete(&self, receipt: &str) -> Result<()>;

    /// Approximate number of messages waiting.
    async fn pending_count(&self) -> Result<u64>;
}

/// Fire-and-forget event notifications.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, detail_type: &str, detail: serde_json::Value) -> Result<()>;
}
