//! S3-compatible object storage client.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication.
//! Works against AWS S3, Cloudflare R2, and other S3-compatible services
//! (MinIO, LocalStack) via a custom endpoint.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing, so there
//! is no C library in the build.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! bucket = "dbhack-untels"
//! namespace = "dbhack-untels"
//! account_id = "537d033e..."               # Cloudflare R2
//! # endpoint_url = "http://localhost:9000" # MinIO
//! # region = "us-east-1"                   # defaults to "auto"
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional, temporary credentials)
//!
//! # Addressing
//!
//! | Setting | Base URL | Style |
//! |---------|----------|-------|
//! | `endpoint_url` | as given | path-style unless `path_style = false` |
//! | `account_id` | `https://<account>.r2.cloudflarestorage.com` | path-style |
//! | neither | `https://<bucket>.s3.<region>.amazonaws.com` | virtual-host |
//!
//! # Operations
//!
//! - **List**: `ListObjectsV2`, one page per call (`max-keys=1000`), with the
//!   continuation token handed back to the caller.
//! - **Presign**: query-string SigV4 for `GET`, `UNSIGNED-PAYLOAD`.
//! - **Put**: header-signed `PutObject`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

// ═══════════════════════════════════════════════════════════════════════
// ObjectStore trait
// ═══════════════════════════════════════════════════════════════════════

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys on this page, in the order the backend returned them.
    pub keys: Vec<String>,
    /// Token for the next page; `None` when the listing is complete.
    pub next_continuation: Option<String>,
}

/// Why a listing call failed.
///
/// Transport and status failures are partial: the caller may skip the prefix
/// and carry on. A malformed body means the backend is not speaking the
/// protocol we expect and is reported as a hard failure.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("failed to list objects under '{prefix}': {source}")]
    Transport {
        prefix: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("ListObjectsV2 failed for '{prefix}' (HTTP {status}): {body}")]
    Status {
        prefix: String,
        status: u16,
        body: String,
    },

    #[error("malformed ListObjectsV2 response for '{prefix}': {reason}")]
    Malformed { prefix: String, reason: String },
}

impl ListingError {
    /// Whether the failure only affects this prefix.
    pub fn is_partial(&self) -> bool {
        !matches!(self, ListingError::Malformed { .. })
    }
}

/// The storage operations the locator and uploader need.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys under `prefix`.
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, ListingError>;

    /// Build a presigned `GET` URL for `key`, valid for `expires_secs`.
    fn presign_get(&self, key: &str, expires_secs: u64) -> Result<String>;

    /// Upload `body` under `key`.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

// ============ AWS Credentials ============

/// AWS-style access credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self::new(access_key_id, secret_access_key, session_token))
    }
}

// ============ Endpoint ============

#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    scheme: String,
    /// Host, with port when non-default. Sent as the signed `host` header.
    host: String,
    path_style: bool,
}

impl Endpoint {
    fn from_config(config: &StorageConfig) -> Self {
        if let Some(ref url) = config.endpoint_url {
            let (scheme, rest) = url.split_once("://").unwrap_or(("https", url.as_str()));
            return Self {
                scheme: scheme.to_string(),
                host: rest.trim_end_matches('/').to_string(),
                path_style: config.path_style.unwrap_or(true),
            };
        }

        if let Some(ref account) = config.account_id {
            return Self {
                scheme: "https".to_string(),
                host: format!("{}.r2.cloudflarestorage.com", account),
                path_style: true,
            };
        }

        Self {
            scheme: "https".to_string(),
            host: format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
            path_style: false,
        }
    }

    fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

// ============ S3Store ============

/// [`ObjectStore`] backed by an S3-compatible HTTP API.
pub struct S3Store {
    client: reqwest::Client,
    creds: AwsCredentials,
    bucket: String,
    region: String,
    endpoint: Endpoint,
}

impl S3Store {
    /// Build a store with credentials from the environment.
    pub fn from_env(config: &StorageConfig) -> Result<Self> {
        Self::new(config, AwsCredentials::from_env()?)
    }

    pub fn new(config: &StorageConfig, creds: AwsCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build storage HTTP client")?;

        Ok(Self {
            client,
            creds,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: Endpoint::from_config(config),
        })
    }

    /// Canonical URI of the bucket itself (target of `ListObjectsV2`).
    fn bucket_uri(&self) -> String {
        if self.endpoint.path_style {
            format!("/{}", uri_encode(&self.bucket))
        } else {
            "/".to_string()
        }
    }

    /// Canonical URI of an object.
    fn object_uri(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        if self.endpoint.path_style {
            format!("/{}/{}", uri_encode(&self.bucket), encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    fn credential_scope(&self, date_stamp: &str) -> String {
        format!("{}/{}/s3/aws4_request", date_stamp, self.region)
    }

    fn sign(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            date_stamp,
            &self.region,
            "s3",
        );
        hex_hmac_sha256(&signing_key, string_to_sign.as_bytes())
    }

    /// Headers that authenticate a request via the `Authorization` header.
    fn auth_headers(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_querystring: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host", self.endpoint.host.clone()),
            ("x-amz-content-sha256", payload_hash.to_string()),
            ("x-amz-date", amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = self.credential_scope(&date_stamp);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = self.sign(&date_stamp, &string_to_sign);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        // reqwest derives `host` from the URL.
        let mut out: Vec<(&'static str, String)> = headers
            .into_iter()
            .filter(|(k, _)| *k != "host")
            .collect();
        out.push(("authorization", authorization));
        out
    }

    /// Presign a `GET` for `key` as of `now`.
    pub fn presign_get_at(&self, key: &str, expires_secs: u64, now: DateTime<Utc>) -> String {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = self.credential_scope(&date_stamp);

        let mut params = vec![
            ("X-Amz-Algorithm", "AWS4-HMAC-SHA256".to_string()),
            (
                "X-Amz-Credential",
                format!("{}/{}", self.creds.access_key_id, credential_scope),
            ),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", expires_secs.to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ];
        if let Some(ref token) = self.creds.session_token {
            params.push(("X-Amz-Security-Token", token.clone()));
        }
        let canonical_querystring = canonical_query(&params);

        let canonical_uri = self.object_uri(key);
        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            canonical_uri, canonical_querystring, self.endpoint.host
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = self.sign(&date_stamp, &string_to_sign);

        format!(
            "{}{}?{}&X-Amz-Signature={}",
            self.endpoint.base_url(),
            canonical_uri,
            canonical_querystring,
            signature
        )
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, ListingError> {
        let mut params = vec![
            ("list-type", "2".to_string()),
            ("max-keys", "1000".to_string()),
            ("prefix", prefix.to_string()),
        ];
        if let Some(token) = continuation {
            params.push(("continuation-token", token.to_string()));
        }
        let canonical_querystring = canonical_query(&params);

        let canonical_uri = self.bucket_uri();
        let payload_hash = hex_sha256(b"");
        let headers = self.auth_headers(
            "GET",
            &canonical_uri,
            &canonical_querystring,
            &payload_hash,
            Utc::now(),
        );

        let url = format!(
            "{}{}?{}",
            self.endpoint.base_url(),
            canonical_uri,
            canonical_querystring
        );
        let mut req_builder = self.client.get(&url);
        for (name, value) in headers {
            req_builder = req_builder.header(name, value);
        }

        let resp = req_builder
            .send()
            .await
            .map_err(|source| ListingError::Transport {
                prefix: prefix.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ListingError::Status {
                prefix: prefix.to_string(),
                status,
                body: body.chars().take(500).collect(),
            });
        }

        let xml_body = resp
            .text()
            .await
            .map_err(|source| ListingError::Transport {
                prefix: prefix.to_string(),
                source,
            })?;

        parse_list_objects_response(&xml_body).map_err(|reason| ListingError::Malformed {
            prefix: prefix.to_string(),
            reason,
        })
    }

    fn presign_get(&self, key: &str, expires_secs: u64) -> Result<String> {
        Ok(self.presign_get_at(key, expires_secs, Utc::now()))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let canonical_uri = self.object_uri(key);
        let payload_hash = hex_sha256(&body);
        let headers = self.auth_headers("PUT", &canonical_uri, "", &payload_hash, Utc::now());

        let url = format!("{}{}", self.endpoint.base_url(), canonical_uri);
        let mut req_builder = self
            .client
            .put(&url)
            .header("content-type", content_type)
            .body(body);
        for (name, value) in headers {
            req_builder = req_builder.header(name, value);
        }

        let resp = req_builder
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.bucket, key))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                body.chars().take(500).collect::<String>()
            );
        }

        Ok(())
    }
}

// ============ AWS SigV4 Helpers ============

/// Sort and encode query parameters into a SigV4 canonical query string.
fn canonical_query(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    sorted.sort();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

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

/// URI-encode a string per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
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

// ============ XML Parsing ============

/// Parse a `ListObjectsV2` XML response.
///
/// Keys ending in `/` are directory placeholders and are skipped. A
/// truncated listing without a continuation token is rejected, since
/// following it would restart from the first page.
fn parse_list_objects_response(xml: &str) -> Result<ListPage, String> {
    // Text is left untrimmed: keys may legitimately begin or end with spaces.
    let mut reader = quick_xml::Reader::from_str(xml);

    let mut saw_root = false;
    let mut in_contents = false;
    let mut current: Option<Vec<u8>> = None;
    let mut keys = Vec::new();
    let mut is_truncated = false;
    let mut next_token = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"ListBucketResult" => saw_root = true,
                    b"Contents" => in_contents = true,
                    _ => {}
                }
                current = Some(name);
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"Contents" {
                    in_contents = false;
                }
                current = None;
            }
            Ok(Event::Text(te)) => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                match current.as_deref() {
                    Some(b"Key") if in_contents => {
                        if !text.ends_with('/') {
                            keys.push(text.into_owned());
                        }
                    }
                    Some(b"IsTruncated") => is_truncated = text.trim() == "true",
                    Some(b"NextContinuationToken") => {
                        next_token = Some(text.trim().to_string())
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err("missing <ListBucketResult> element".to_string());
    }

    let next_continuation = if is_truncated {
        match next_token {
            Some(token) => Some(token),
            None => return Err("truncated listing without NextContinuationToken".to_string()),
        }
    } else {
        None
    };

    Ok(ListPage {
        keys,
        next_continuation,
    })
}
