//! Amazon S3 blob store.
//!
//! Lists, reads, writes and deletes objects in one bucket using the S3 REST
//! API with AWS Signature V4 authentication (see [`crate::aws`]). Supports
//! custom endpoints for S3-compatible services (MinIO, LocalStack), which
//! are addressed path-style.
//!
//! # Pagination
//!
//! Large prefixes (1000+ objects) are handled automatically via the
//! `ListObjectsV2` continuation token mechanism.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use geo_harvester_core::io::{BlobInfo, BlobStore};
use geo_harvester_core::xml;

use crate::aws::{encode_key_path, send_signed, AwsCredentials, Endpoint, RequestToSign};
use crate::config::AwsConfig;

// ═══════════════════════════════════════════════════════════════════════
// BlobStore implementation
// ═══════════════════════════════════════════════════════════════════════

pub struct S3BlobStore {
    bucket: String,
    region: String,
    endpoint: Endpoint,
    path_style: bool,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    pub fn new(bucket: impl Into<String>, aws: &AwsConfig, creds: AwsCredentials) -> Self {
        let bucket = bucket.into();
        let endpoint = Endpoint::resolve(
            aws.s3_endpoint.as_deref(),
            format!("{}.s3.{}.amazonaws.com", bucket, aws.region),
        );
        Self {
            path_style: aws.s3_endpoint.is_some(),
            bucket,
            region: aws.region.clone(),
            endpoint,
            creds,
            client: reqwest::Client::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_uri(&self, key: &str) -> String {
        if self.path_style {
            format!("/{}/{}", self.bucket, encode_key_path(key))
        } else {
            format!("/{}", encode_key_path(key))
        }
    }

    fn bucket_uri(&self) -> String {
        if self.path_style {
            format!("/{}", self.bucket)
        } else {
            "/".to_string()
        }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        query: &[(String, String)],
        payload: &[u8],
    ) -> Result<reqwest::Response> {
        let req = RequestToSign {
            method,
            service: "s3",
            region: &self.region,
            host: &self.endpoint.host,
            canonical_uri: uri,
            query,
            headers: &[],
            payload,
        };
        send_signed(&self.client, &self.creds, &self.endpoint, &req).await
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    /// List every object under `prefix`, following continuation tokens.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self
                .request("GET", &self.bucket_uri(), &query, b"")
                .await
                .with_context(|| format!("Failed to list s3://{}/{}", self.bucket, prefix))?;
            let body = resp.text().await?;
            let page = parse_list_objects_response(&body)?;
            debug!(bucket = %self.bucket, prefix, count = page.objects.len(), "listed S3 page");
            objects.extend(page.objects);

            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .request("GET", &self.object_uri(key), &[], b"")
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.request("PUT", &self.object_uri(key), &[], &bytes)
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.bucket, key))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 answers 204 for missing keys too
        self.request("DELETE", &self.object_uri(key), &[], b"")
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;
        Ok(())
    }

    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

// ============ ListObjectsV2 parsing ============

struct ListPage {
    objects: Vec<BlobInfo>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn parse_list_objects_response(body: &str) -> Result<ListPage> {
    let root = xml::parse(body.as_bytes()).map_err(|e| anyhow!("bad ListObjectsV2 response: {}", e))?;

    let is_truncated = root
        .child("IsTruncated")
        .map(|e| e.text() == "true")
        .unwrap_or(false);
    let next_token = root
        .child("NextContinuationToken")
        .map(|e| e.raw_text().to_string())
        .filter(|t| !t.is_empty());

    let objects = root
        .children_named("Contents")
        .filter_map(|c| {
            let key = c.child("Key")?.raw_text().to_string();
            if key.is_empty() || key.ends_with('/') {
                return None;
            }
            let last_modified = c
                .child("LastModified")
                .and_then(|e| DateTime::parse_from_rfc3339(&e.text()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            let size = c
                .child("Size")
                .and_then(|e| e.text().parse::<u64>().ok())
                .unwrap_or(0);
            Some(BlobInfo {
                key,
                last_modified,
                size,
            })
        })
        .collect();

    Ok(ListPage {
        objects,
        is_truncated,
        next_token,
    })
}
