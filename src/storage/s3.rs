//! S3-compatible object store client
//!
//! Talks to S3, MinIO and similar services using path-style addressing
//! (`{endpoint}/{bucket}/{key}`). Listing uses ListObjectsV2 and follows
//! continuation tokens until the listing is complete. Requests are signed
//! with AWS Signature Version 4 when credentials are configured and sent
//! anonymously otherwise.

use crate::config::ObjectStoreConfig;
use crate::error::{Result, StratumError};
use crate::storage::ObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";
/// SHA-256 of the empty request body
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

/// Access key pair used for request signing
#[derive(Clone)]
struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Object store client for S3-compatible endpoints
#[derive(Debug)]
pub struct S3ObjectStore {
    client: Client,
    endpoint: Url,
    region: String,
    credentials: Option<Credentials>,
    key_pattern: Regex,
    token_pattern: Regex,
    truncated_pattern: Regex,
    error_pattern: Regex,
}

impl S3ObjectStore {
    /// Create a client from object store configuration
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Config` if the endpoint is not a valid URL
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::config::ObjectStoreConfig;
    /// use stratum::storage::S3ObjectStore;
    ///
    /// let store = S3ObjectStore::new(&ObjectStoreConfig::default());
    /// assert!(store.is_ok());
    /// ```
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            StratumError::Config(format!("invalid object store endpoint {}: {}", config.endpoint, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StratumError::ObjectStore(format!("failed to create HTTP client: {}", e)))?;

        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
            }),
            _ => None,
        };

        tracing::info!(
            "Initialized S3 object store: endpoint={}, region={}, signed={}",
            endpoint,
            config.region,
            credentials.is_some()
        );

        Ok(Self {
            client,
            endpoint,
            region: config.region.clone(),
            credentials,
            key_pattern: compile(r"<Key>([^<]*)</Key>")?,
            token_pattern: compile(r"<NextContinuationToken>([^<]*)</NextContinuationToken>")?,
            truncated_pattern: compile(r"<IsTruncated>\s*true\s*</IsTruncated>")?,
            error_pattern: compile(r"(?s)<Code>([^<]*)</Code>.*?<Message>([^<]*)</Message>")?,
        })
    }

    /// Canonical path for a bucket or an object inside it
    fn object_path(&self, bucket: &str, key: Option<&str>) -> String {
        let mut path = self.endpoint.path().trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(&urlencoding::encode(bucket));
        if let Some(key) = key {
            for segment in key.split('/') {
                path.push('/');
                path.push_str(&urlencoding::encode(segment));
            }
        }
        path
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    async fn send_get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let canonical_query = canonical_query_string(query);

        let mut url = self.endpoint.clone();
        url.set_path(path);
        url.set_query(if canonical_query.is_empty() {
            None
        } else {
            Some(&canonical_query)
        });

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut request = self
            .client
            .get(url.as_str())
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256);

        if let Some(credentials) = &self.credentials {
            let authorization = authorization_header(
                credentials,
                &self.region,
                now,
                path,
                &canonical_query,
                &self.host_header(),
            )?;
            request = request.header("authorization", authorization);
        }

        let response = request.send().await.map_err(|e| {
            StratumError::ObjectStore(format!("request to {} failed: {}", path, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = self
                .error_pattern
                .captures(&body)
                .map(|c| format!("{}: {}", &c[1], xml_unescape(&c[2])))
                .unwrap_or_else(|| body.trim().to_string());
            return Err(StratumError::ObjectStore(format!(
                "GET {} returned {}: {}",
                path, status, detail
            ))
            .into());
        }

        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let path = self.object_path(bucket, None);
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut query = vec![("list-type", "2")];
            if let Some(token) = token.as_deref() {
                query.push(("continuation-token", token));
            }

            let body = self
                .send_get(&path, &query)
                .await?
                .text()
                .await
                .map_err(|e| StratumError::ObjectStore(format!("failed to read listing: {}", e)))?;
            pages += 1;

            keys.extend(
                self.key_pattern
                    .captures_iter(&body)
                    .map(|c| xml_unescape(&c[1])),
            );

            let next = if self.truncated_pattern.is_match(&body) {
                self.token_pattern
                    .captures(&body)
                    .map(|c| xml_unescape(&c[1]))
            } else {
                None
            };

            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        keys.sort();
        tracing::debug!(bucket = %bucket, pages, keys = keys.len(), "Listed S3 bucket");
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(StratumError::ObjectStore("object key cannot be empty".to_string()).into());
        }

        let path = self.object_path(bucket, Some(key));
        let bytes = self
            .send_get(&path, &[])
            .await?
            .bytes()
            .await
            .map_err(|e| {
                StratumError::ObjectStore(format!("failed to read {}/{}: {}", bucket, key, e))
            })?;

        tracing::debug!(bucket = %bucket, key = %key, bytes = bytes.len(), "Fetched S3 object");
        Ok(bytes.to_vec())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| StratumError::ObjectStore(format!("bad pattern: {}", e)).into())
}

/// Sorted `key=value` pairs with both sides URI-encoded
fn canonical_query_string(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StratumError::ObjectStore(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derives the SigV4 signing key for one day, region and service
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn authorization_header(
    credentials: &Credentials,
    region: &str,
    now: DateTime<Utc>,
    canonical_uri: &str,
    canonical_query: &str,
    host: &str,
) -> Result<String> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let canonical_request = format!(
        "GET\n{}\n{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        canonical_uri,
        canonical_query,
        host,
        EMPTY_PAYLOAD_SHA256,
        amz_date,
        SIGNED_HEADERS,
        EMPTY_PAYLOAD_SHA256
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(&credentials.secret_access_key, &date, region, SERVICE)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, SIGNED_HEADERS, signature
    ))
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
