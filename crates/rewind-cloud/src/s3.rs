use chrono::{DateTime, Utc};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode,
};
use rewind_core::{
    model::CredentialRecord,
    storage::{ObjectInfo, ObjectStore},
    ProviderError,
};
use tracing::{debug, instrument};

use crate::presign::{HttpMethod, PresignedUrlBuilder};

/// Region in which buckets are created without a location constraint.
const US_EAST_1: &str = "us-east-1";

/// Upper bound on how much of an error body is quoted back.
const MAX_ERROR_BODY: usize = 512;

/// Where the S3-compatible service lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Override for S3-compatible services (MinIO, LocalStack, ...).
    pub endpoint: Option<String>,
    pub region: String,
}

impl S3Settings {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            region: region.into(),
        }
    }

    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Object store backed by an S3-compatible HTTP API (path-style addressing).
///
/// Without credentials every call fails with a provider error, which callers
/// treat the same as an unreachable bucket.
pub struct S3ObjectStore {
    client: Client,
    endpoint: String,
    region: String,
    credentials: Option<CredentialRecord>,
}

impl S3ObjectStore {
    pub fn new(
        settings: &S3Settings,
        credentials: Option<CredentialRecord>,
    ) -> Result<Self, ProviderError> {
        let endpoint = settings.endpoint_url();
        let client = Client::builder()
            .user_agent(concat!("rewind/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::new("build_client", &endpoint, e))?;
        Ok(Self {
            client,
            endpoint,
            region: settings.region.clone(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn presign(
        &self,
        operation: &'static str,
        method: HttpMethod,
        bucket: &str,
        key: Option<&str>,
        query: &[(&str, &str)],
    ) -> Result<String, ProviderError> {
        let resource = resource_name(bucket, key);
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ProviderError::new(operation, &resource, "no cloud credentials configured")
        })?;

        let mut builder = PresignedUrlBuilder::new(&self.endpoint, bucket)
            .method(method)
            .region(&self.region)
            .access_key(&credentials.access_key_id)
            .secret_key(&credentials.secret_key);
        if let Some(key) = key {
            builder = builder.key(key);
        }
        for (name, value) in query {
            builder = builder.query(name, value);
        }
        builder
            .build()
            .map_err(|e| ProviderError::new(operation, resource, e))
    }

    fn request(&self, method: HttpMethod, url: &str) -> RequestBuilder {
        match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
            HttpMethod::Head => self.client.head(url),
        }
    }

    fn send(
        &self,
        operation: &'static str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<Response, ProviderError> {
        let response = request
            .send()
            .map_err(|e| ProviderError::new(operation, resource, e))?;
        debug!(operation, resource, status = %response.status(), "s3 response");
        Ok(response)
    }
}

impl ObjectStore for S3ObjectStore {
    #[instrument(skip_all, fields(bucket = %bucket))]
    fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError> {
        let url = self.presign("head_bucket", HttpMethod::Head, bucket, None, &[])?;
        let response = self.send("head_bucket", bucket, self.request(HttpMethod::Head, &url))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(failure("head_bucket", bucket, response)),
        }
    }

    #[instrument(skip_all, fields(bucket = %bucket, region = %region))]
    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ProviderError> {
        let url = self.presign("create_bucket", HttpMethod::Put, bucket, None, &[])?;
        let mut request = self.request(HttpMethod::Put, &url);
        if region != US_EAST_1 {
            request = request.body(format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{region}</LocationConstraint>\
                 </CreateBucketConfiguration>"
            ));
        }
        let response = self.send("create_bucket", bucket, request)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(failure("create_bucket", bucket, response))
        }
    }

    #[instrument(skip_all, fields(bucket = %bucket))]
    fn delete_bucket(&self, bucket: &str) -> Result<(), ProviderError> {
        let url = self.presign("delete_bucket", HttpMethod::Delete, bucket, None, &[])?;
        let response = self.send("delete_bucket", bucket, self.request(HttpMethod::Delete, &url))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(failure("delete_bucket", bucket, response))
        }
    }

    #[instrument(skip_all, fields(bucket = %bucket, key = %key, size = bytes.len()))]
    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ProviderError> {
        let resource = resource_name(bucket, Some(key));
        let url = self.presign("put_object", HttpMethod::Put, bucket, Some(key), &[])?;
        let request = self
            .request(HttpMethod::Put, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec());
        let response = self.send("put_object", &resource, request)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(failure("put_object", &resource, response))
        }
    }

    #[instrument(skip_all, fields(bucket = %bucket, key = %key))]
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let resource = resource_name(bucket, Some(key));
        let url = self.presign("get_object", HttpMethod::Get, bucket, Some(key), &[])?;
        let response = self.send("get_object", &resource, self.request(HttpMethod::Get, &url))?;
        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .map_err(|e| ProviderError::new("get_object", &resource, e))?;
            return Ok(Some(bytes.to_vec()));
        }

        let body = response.text().unwrap_or_default();
        if status == StatusCode::NOT_FOUND && tag_text(&body, "Code") != Some("NoSuchBucket") {
            return Ok(None);
        }
        Err(ProviderError::new(
            "get_object",
            resource,
            describe_failure(status, &body),
        ))
    }

    #[instrument(skip_all, fields(bucket = %bucket))]
    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, ProviderError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let url = match token.as_deref() {
                Some(token) => self.presign(
                    "list_objects",
                    HttpMethod::Get,
                    bucket,
                    None,
                    &[("list-type", "2"), ("continuation-token", token)],
                )?,
                None => self.presign(
                    "list_objects",
                    HttpMethod::Get,
                    bucket,
                    None,
                    &[("list-type", "2")],
                )?,
            };
            let response = self.send("list_objects", bucket, self.request(HttpMethod::Get, &url))?;
            if !response.status().is_success() {
                return Err(failure("list_objects", bucket, response));
            }
            let body = response
                .text()
                .map_err(|e| ProviderError::new("list_objects", bucket, e))?;

            let page = parse_list_page(&body);
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        debug!(count = objects.len(), "listed bucket");
        Ok(objects)
    }
}

fn resource_name(bucket: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("{bucket}/{key}"),
        None => bucket.to_string(),
    }
}

fn failure(operation: &'static str, resource: &str, response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    ProviderError::new(operation, resource, describe_failure(status, &body))
}

/// `403 Forbidden: AccessDenied (Access Denied)` style summary of an S3 error.
fn describe_failure(status: StatusCode, body: &str) -> String {
    match (tag_text(body, "Code"), tag_text(body, "Message")) {
        (Some(code), Some(message)) => format!("{status}: {code} ({})", unescape(message)),
        (Some(code), None) => format!("{status}: {code}"),
        _ if body.trim().is_empty() => status.to_string(),
        _ => {
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            format!("{status}: {snippet}")
        }
    }
}

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    objects: Vec<ObjectInfo>,
    next_token: Option<String>,
}

fn parse_list_page(xml: &str) -> ListPage {
    let objects = elements(xml, "Contents")
        .into_iter()
        .filter_map(|contents| {
            let key = unescape(tag_text(contents, "Key")?);
            let size = tag_text(contents, "Size")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            let last_modified = tag_text(contents, "LastModified")
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Some(ObjectInfo {
                key,
                size,
                last_modified,
            })
        })
        .collect();

    let truncated = tag_text(xml, "IsTruncated").map(str::trim) == Some("true");
    let next_token = if truncated {
        tag_text(xml, "NextContinuationToken").map(unescape)
    } else {
        None
    };
    ListPage {
        objects,
        next_token,
    }
}

/// Text between the first `<tag>` and its closing tag.
fn tag_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(&xml[start..end])
}

/// Bodies of every `<tag>...</tag>` element, in document order.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let body_start = start + open.len();
        let Some(len) = rest[body_start..].find(&close) else {
            break;
        };
        out.push(&rest[body_start..body_start + len]);
        rest = &rest[body_start + len + close.len()..];
    }
    out
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
