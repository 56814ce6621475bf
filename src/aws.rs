//! AWS request signing shared by the S3, SQS and EventBridge clients.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing, no
//! C library dependencies like `aws-lc-sys`.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)
//!
//! # Authentication
//!
//! Every request is signed with
//! [AWS Signature Version 4](https://docs.aws.amazon.com/IAM/latest/UserGuide/create-signed-request.html):
//!
//! ```text
//! canonical request ─▶ string to sign ─▶ HMAC(signing key) ─▶ Authorization
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

// ============ AWS Credentials ============

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl AwsCredentials {
    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Endpoints ============

/// Where a service is reached: scheme plus host (and port).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
}

impl Endpoint {
    /// The custom endpoint if set (LocalStack, MinIO), else `https://<default_host>`.
    pub fn resolve(custom: Option<&str>, default_host: String) -> Self {
        match custom {
            Some(url) => {
                let (scheme, rest) = match url.split_once("://") {
                    Some((s, r)) => (s.to_string(), r),
                    None => ("https".to_string(), url),
                };
                Self {
                    scheme,
                    host: rest.trim_end_matches('/').to_string(),
                }
            }
            None => Self {
                scheme: "https".to_string(),
                host: default_host,
            },
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self.host, path)
    }
}

// ============ Signing ============

/// One request to sign.
pub struct RequestToSign<'a> {
    pub method: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub host: &'a str,
    /// Already URI-encoded path, starting with `/`.
    pub canonical_uri: &'a str,
    pub query: &'a [(String, String)],
    /// Extra headers to sign and send, names lower-case.
    pub headers: &'a [(String, String)],
    pub payload: &'a [u8],
}

/// Headers to attach to the request, `Authorization` included.
pub fn sign(
    creds: &AwsCredentials,
    req: &RequestToSign<'_>,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(req.payload);

    let mut headers = vec![
        ("host".to_string(), req.host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.extend(req.headers.iter().cloned());
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        req.method,
        req.canonical_uri,
        canonical_query(req.query),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, req.region, req.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &creds.secret_access_key,
        &date_stamp,
        req.region,
        req.service,
    );
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    // reqwest sets Host itself
    let mut out: Vec<(String, String)> = headers.into_iter().filter(|(k, _)| k != "host").collect();
    out.push(("authorization".to_string(), authorization));
    out
}

/// Sign and send; non-2xx responses become errors carrying the body.
pub async fn send_signed(
    client: &reqwest::Client,
    creds: &AwsCredentials,
    endpoint: &Endpoint,
    req: &RequestToSign<'_>,
) -> Result<reqwest::Response> {
    let headers = sign(creds, req, Utc::now());
    let query = canonical_query(req.query);
    let mut url = endpoint.url(req.canonical_uri);
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }

    let method = reqwest::Method::from_bytes(req.method.as_bytes())
        .with_context(|| format!("invalid HTTP method: {}", req.method))?;
    let mut builder = client.request(method, &url);
    for (k, v) in &headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    if !req.payload.is_empty() {
        builder = builder.body(req.payload.to_vec());
    }

    let resp = builder
        .send()
        .await
        .with_context(|| format!("{} {} request failed", req.service, req.method))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!(
            "{} {} {} failed (HTTP {}): {}",
            req.service,
            req.method,
            req.canonical_uri,
            status,
            body.chars().take(500).collect::<String>()
        );
    }
    Ok(resp)
}

// ============ AWS SigV4 Helpers ============

/// Sorted, encoded `k=v&k=v`.
fn canonical_query(query: &[(String, String)]) -> String {
    let mut sorted = query.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the hex-encoded SHA-256 hash of data.
pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
pub fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Encode each `/`-separated segment of an object key.
pub fn encode_key_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: None,
        }
    }

    #[test]
    fn signing_key_matches_published_example() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn uri_encoding_keeps_unreserved() {
        assert_eq!(uri_encode("a b/c~d"), "a%20b%2Fc~d");
        assert_eq!(encode_key_path("cdn/geo/a b.zip"), "cdn/geo/a%20b.zip");
    }

    #[test]
    fn signature_is_deterministic_and_scoped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let query = vec![("prefix".to_string(), "geo/".to_string())];
        let req = RequestToSign {
            method: "GET",
            service: "s3",
            region: "us-east-1",
            host: "bucket.s3.us-east-1.amazonaws.com",
            canonical_uri: "/",
            query: &query,
            headers: &[],
            payload: b"",
        };
        let a = sign(&creds(), &req, now);
        let b = sign(&creds(), &req, now);
        assert_eq!(a, b);

        let auth = &a.iter().find(|(k, _)| k == "authorization").unwrap().1;
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/us-east-1/s3/aws4_request"
        ));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date,"));
        assert!(!a.iter().any(|(k, _)| k == "host"));
    }

    #[test]
    fn session_token_is_signed() {
        let mut c = creds();
        c.session_token = Some("token".into());
        let req = RequestToSign {
            method: "POST",
            service: "sqs",
            region: "us-east-1",
            host: "sqs.us-east-1.amazonaws.com",
            canonical_uri: "/",
            query: &[],
            headers: &[("x-amz-target".to_string(), "AmazonSQS.GetQueueUrl".to_string())],
            payload: b"{}",
        };
        let headers = sign(&c, &req, Utc::now());
        let auth = &headers.iter().find(|(k, _)| k == "authorization").unwrap().1;
        assert!(auth.contains("x-amz-security-token;x-amz-target"));
    }

    #[test]
    fn custom_endpoint_keeps_scheme() {
        let e = Endpoint::resolve(Some("http://localhost:4566/"), "unused".into());
        assert_eq!(e.url("/q"), "http://localhost:4566/q");
        let e = Endpoint::resolve(None, "sqs.us-east-1.amazonaws.com".into());
        assert_eq!(e.url("/"), "https://sqs.us-east-1.amazonaws.com/");
    }
}
