//! Presigned URLs for S3-compatible requests.
//!
//! Requests are authenticated with AWS Signature Version 4 in query-string
//! form: the signature travels in the URL, so the HTTP client only has to
//! send the request as-is. Payloads are declared `UNSIGNED-PAYLOAD`.
//!
//! ```no_run
//! use rewind_cloud::presign::{HttpMethod, PresignedUrlBuilder};
//!
//! let url = PresignedUrlBuilder::new("http://localhost:9000", "versions")
//!     .key("0b7f3c1e-5d0a-4c3e-9d2b-1f6a7e8c9d00.enc")
//!     .method(HttpMethod::Put)
//!     .access_key("access")
//!     .secret_key("secret")
//!     .build()
//!     .unwrap();
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// Maximum expiration time for presigned URLs (7 days in seconds).
const MAX_EXPIRES_SECONDS: u64 = 604_800;

const DEFAULT_EXPIRES_SECONDS: u64 = 300;

const DEFAULT_REGION: &str = "us-east-1";

const SERVICE: &str = "s3";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PresignError {
    #[error("access key is required")]
    MissingAccessKey,
    #[error("secret key is required")]
    MissingSecretKey,
    #[error("bucket name is invalid")]
    InvalidBucket,
    #[error("endpoint URL is invalid")]
    InvalidEndpoint,
}

/// Builder for presigned bucket- and object-level URLs (path-style).
pub struct PresignedUrlBuilder {
    endpoint: String,
    bucket: String,
    key: String,
    method: HttpMethod,
    query: BTreeMap<String, String>,
    expires_seconds: u64,
    access_key: String,
    secret_key: String,
    region: String,
    timestamp: Option<DateTime<Utc>>,
}

impl PresignedUrlBuilder {
    /// Start a bucket-level request; add [`key`](Self::key) for an object.
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            key: String::new(),
            method: HttpMethod::Get,
            query: BTreeMap::new(),
            expires_seconds: DEFAULT_EXPIRES_SECONDS,
            access_key: String::new(),
            secret_key: String::new(),
            region: DEFAULT_REGION.to_string(),
            timestamp: None,
        }
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = key.trim_start_matches('/').to_string();
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Add a request parameter (e.g. `list-type=2`); it is signed too.
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    /// Capped at 7 days.
    pub fn expires_in_seconds(mut self, seconds: u64) -> Self {
        self.expires_seconds = seconds.min(MAX_EXPIRES_SECONDS);
        self
    }

    pub fn access_key(mut self, key: &str) -> Self {
        self.access_key = key.to_string();
        self
    }

    pub fn secret_key(mut self, key: &str) -> Self {
        self.secret_key = key.to_string();
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    /// Fix the signing time (for tests).
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn build(self) -> Result<String, PresignError> {
        if self.access_key.is_empty() {
            return Err(PresignError::MissingAccessKey);
        }
        if self.secret_key.is_empty() {
            return Err(PresignError::MissingSecretKey);
        }
        if self.bucket.is_empty() || self.bucket.contains('/') {
            return Err(PresignError::InvalidBucket);
        }

        let now = self.timestamp.unwrap_or_else(Utc::now);
        let date_str = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = format!("{date_str}/{}/{SERVICE}/aws4_request", self.region);

        let canonical_uri = if self.key.is_empty() {
            format!("/{}", self.bucket)
        } else {
            format!("/{}/{}", self.bucket, self.key)
        };
        let encoded_uri = uri_encode_path(&canonical_uri);

        let mut params = self.query.clone();
        params.insert("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into());
        params.insert(
            "X-Amz-Credential".into(),
            format!("{}/{credential_scope}", self.access_key),
        );
        params.insert("X-Amz-Date".into(), amz_date.clone());
        params.insert("X-Amz-Expires".into(), self.expires_seconds.to_string());
        params.insert("X-Amz-SignedHeaders".into(), "host".into());
        let canonical_query_string = build_canonical_query_string(&params);

        let host = extract_host(&self.endpoint)?;
        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.method.as_str(),
            encoded_uri,
            canonical_query_string,
            host
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = calculate_signature(&self.secret_key, &date_str, &self.region, &string_to_sign);

        Ok(format!(
            "{}{}?{}&X-Amz-Signature={}",
            self.endpoint, encoded_uri, canonical_query_string, signature
        ))
    }
}

/// URI-encode a path, preserving slashes.
fn uri_encode_path(path: &str) -> String {
    encode(path, true)
}

/// URI-encode a query name or value.
fn uri_encode_value(value: &str) -> String {
    encode(value, false)
}

fn encode(input: &str, keep_slash: bool) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            b'/' if keep_slash => result.push('/'),
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

fn build_canonical_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode_value(k), uri_encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = match Hmac::<Sha256>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn calculate_signature(secret_key: &str, date: &str, region: &str, string_to_sign: &str) -> String {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}

/// Host (and port) of an endpoint URL.
fn extract_host(endpoint: &str) -> Result<String, PresignError> {
    let host = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .unwrap_or(endpoint);
    let host = host.split('/').next().unwrap_or(host);

    if host.is_empty() {
        return Err(PresignError::InvalidEndpoint);
    }
    Ok(host.to_string())
}
