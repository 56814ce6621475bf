//! Amazon EventBridge publisher.
//!
//! Sends one `PutEvents` entry per call on the configured bus, with source
//! `geo-harvester.app`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use geo_harvester_core::io::EventPublisher;

use crate::aws::{send_signed, AwsCredentials, Endpoint, RequestToSign};
use crate::config::AwsConfig;

pub const EVENT_SOURCE: &str = "geo-harvester.app";

pub struct EventBridgePublisher {
    bus_name: String,
    region: String,
    endpoint: Endpoint,
    creds: AwsCredentials,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsResponse {
    #[serde(default)]
    failed_entry_count: u64,
    #[serde(default)]
    entries: Vec<PutEventsResultEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutEventsResultEntry {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl EventBridgePublisher {
    pub fn new(aws: &AwsConfig, creds: AwsCredentials) -> Self {
        Self {
            bus_name: aws.event_bus_name.clone(),
            region: aws.region.clone(),
            endpoint: Endpoint::resolve(
                aws.events_endpoint.as_deref(),
                format!("events.{}.amazonaws.com", aws.region),
            ),
            creds,
            client: reqwest::Client::new(),
        }
    }
}

/// One PutEvents entry. `Detail` is a JSON string, not an object.
fn put_events_body(bus: &str, detail_type: &str, detail: &serde_json::Value) -> serde_json::Value {
    json!({
        "Entries": [{
            "Source": EVENT_SOURCE,
            "DetailType": detail_type,
            "Detail": detail.to_string(),
            "EventBusName": bus,
        }]
    })
}

#[async_trait]
impl EventPublisher for EventBridgePublisher {
    async fn publish(&self, detail_type: &str, detail: serde_json::Value) -> Result<()> {
        let payload = serde_json::to_vec(&put_events_body(&self.bus_name, detail_type, &detail))?;
        let headers = [
            (
                "content-type".to_string(),
                "application/x-amz-json-1.1".to_string(),
            ),
            (
                "x-amz-target".to_string(),
                "AWSEvents.PutEvents".to_string(),
            ),
        ];
        let req = RequestToSign {
            method: "POST",
            service: "events",
            region: &self.region,
            host: &self.endpoint.host,
            canonical_uri: "/",
            query: &[],
            headers: &headers,
            payload: &payload,
        };
        let resp = send_signed(&self.client, &self.creds, &self.endpoint, &req)
            .await
            .context("EventBridge PutEvents failed")?;
        let parsed: PutEventsResponse = resp
            .json()
            .await
            .context("EventBridge PutEvents returned invalid JSON")?;

        if parsed.failed_entry_count > 0 {
            let entry = parsed.entries.first();
            bail!(
                "EventBridge rejected event: {} {}",
                entry.and_then(|e| e.error_code.as_deref()).unwrap_or("unknown"),
                entry.and_then(|e| e.error_message.as_deref()).unwrap_or("")
            );
        }
        if let Some(id) = parsed.entries.first().and_then(|e| e.event_id.as_deref()) {
            debug!(event_id = id, "EventBridge event created");
        }
        Ok(())
    }
}
