//! Amazon SQS queue client.
//!
//! Speaks the SQS JSON protocol (`X-Amz-Target: AmazonSQS.<Action>`). The
//! queue URL is looked up once from the queue name and cached.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use geo_harvester_core::io::{Queue, QueueMessage};

use crate::aws::{send_signed, AwsCredentials, Endpoint, RequestToSign};
use crate::config::{AwsConfig, MitConfig};

pub struct SqsQueue {
    name: String,
    region: String,
    endpoint: Endpoint,
    wait_seconds: u32,
    creds: AwsCredentials,
    client: reqwest::Client,
    queue_url: OnceCell<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueUrlResponse {
    queue_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(default)]
    messages: Vec<SqsMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SqsMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    #[serde(default)]
    attributes: std::collections::HashMap<String, String>,
}

impl SqsQueue {
    pub fn new(name: impl Into<String>, aws: &AwsConfig, mit: &MitConfig, creds: AwsCredentials) -> Self {
        Self {
            name: name.into(),
            region: aws.region.clone(),
            endpoint: Endpoint::resolve(
                aws.sqs_endpoint.as_deref(),
                format!("sqs.{}.amazonaws.com", aws.region),
            ),
            wait_seconds: mit.wait_seconds,
            creds,
            client: reqwest::Client::new(),
            queue_url: OnceCell::new(),
        }
    }

    async fn call(&self, action: &str, body: Value) -> Result<Value> {
        let payload = serde_json::to_vec(&body)?;
        let headers = [
            (
                "content-type".to_string(),
                "application/x-amz-json-1.0".to_string(),
            ),
            ("x-amz-target".to_string(), format!("AmazonSQS.{}", action)),
        ];
        let req = RequestToSign {
            method: "POST",
            service: "sqs",
            region: &self.region,
            host: &self.endpoint.host,
            canonical_uri: "/",
            query: &[],
            headers: &headers,
            payload: &payload,
        };
        let resp = send_signed(&self.client, &self.creds, &self.endpoint, &req)
            .await
            .with_context(|| format!("SQS {} on '{}' failed", action, self.name))?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("SQS {} returned invalid JSON", action))
    }

    async fn url(&self) -> Result<&str> {
        let url = self
            .queue_url
            .get_or_try_init(|| async {
                let resp = self
                    .call("GetQueueUrl", json!({ "QueueName": self.name }))
                    .await?;
                let parsed: GetQueueUrlResponse = serde_json::from_value(resp)?;
                debug!(queue = %self.name, url = %parsed.queue_url, "resolved queue URL");
                Ok::<_, anyhow::Error>(parsed.queue_url)
            })
            .await?;
        Ok(url.as_str())
    }
}

#[async_trait]
impl Queue for SqsQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>> {
        let url = self.url().await?;
        let resp = self
            .call(
                "ReceiveMessage",
                json!({
                    "QueueUrl": url,
                    "MaxNumberOfMessages": max.clamp(1, 10),
                    "WaitTimeSeconds": self.wait_seconds,
                }),
            )
            .await?;
        let parsed: ReceiveMessageResponse = serde_json::from_value(resp)?;
        Ok(parsed
            .messages
            .into_iter()
            .map(|m| QueueMessage {
                id: m.message_id,
                receipt: m.receipt_handle,
                body: m.body,
            })
            .collect())
    }

    async fn delete(&self, receipt: &str) -> Result<()> {
        let url = self.url().await?;
        self.call(
            "DeleteMessage",
            json!({ "QueueUrl": url, "ReceiptHandle": receipt }),
        )
        .await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64> {
        let url = self.url().await?;
        let resp = self
            .call(
                "GetQueueAttributes",
                json!({
                    "QueueUrl": url,
                    "AttributeNames": ["ApproximateNumberOfMessages"],
                }),
            )
            .await?;
        let parsed: GetQueueAttributesResponse = serde_json::from_value(resp)?;
        let count = parsed
            .attributes
            .get("ApproximateNumberOfMessages")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("ApproximateNumberOfMessages is not a number")?
            .unwrap_or(0);
        Ok(count)
    }
}
