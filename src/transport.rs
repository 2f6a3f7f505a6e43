//! HTTP session (C3)
//!
//! One `reqwest::Client` per `RegistryEndpoint`, reused across every
//! request so the connection pool is shared the way §4.3/§5 require. This
//! layer never retries on its own — `send_with_retry` below is the single
//! place that loop lives, shared by the blob and manifest protocols, so
//! retry policy (§4.4.5/§7) is applied once rather than duplicated per
//! caller.

use crate::endpoint::RegistryEndpoint;
use crate::error::{PusherError, Result};
use crate::logging::Logger;
use crate::retry::{is_retriable_status, RetryPolicy};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method};
use std::future::Future;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Patch,
    Put,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(m: HttpMethod) -> Method {
        match m {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// {status, headers (case-insensitive map), body}, per §4.3.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn docker_content_digest(&self) -> Option<&str> {
        self.headers.get("docker-content-digest").and_then(|v| v.to_str().ok())
    }

    /// First 256 bytes of the body as a diagnostic snippet.
    pub fn body_snippet(&self) -> String {
        let take = self.body.len().min(256);
        String::from_utf8_lossy(&self.body[..take]).into_owned()
    }

    fn retry_after(&self) -> Option<std::time::Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(std::time::Duration::from_secs)
    }
}

pub struct HttpSession {
    client: Client,
    base_url: Url,
}

impl Clone for HttpSession {
    fn clone(&self) -> Self {
        HttpSession { client: self.client.clone(), base_url: self.base_url.clone() }
    }
}

impl HttpSession {
    pub fn new(endpoint: &RegistryEndpoint) -> Result<Self> {
        let base_url = Url::parse(&endpoint.base_url)
            .map_err(|e| PusherError::Validation(format!("invalid base_url: {}", e)))?;
        let client = Client::builder()
            .pool_max_idle_per_host(30)
            .timeout(endpoint.request_timeout)
            .build()
            .map_err(PusherError::from)?;
        Ok(HttpSession { client, base_url })
    }

    /// Resolves `path_or_url` against `base_url`. Absolute URLs fully
    /// replace per `Url::join`'s semantics, which is exactly the
    /// relative-vs-absolute Location normalization §4.3/§9 ask for.
    fn resolve(&self, path_or_url: &str) -> Result<Url> {
        self.base_url
            .join(path_or_url)
            .map_err(|e| PusherError::Validation(format!("invalid URL {:?}: {}", path_or_url, e)))
    }

    /// Issues one request with no retry. Returns `Err` only for transport
    /// failures (DNS, connect, timeout); any status the server returns,
    /// including 4xx/5xx, comes back as a normal `Ok(HttpResponse)` for the
    /// caller to interpret.
    pub async fn send(
        &self,
        method: HttpMethod,
        path_or_url: &str,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<HttpResponse> {
        self.send_accepting(method, path_or_url, body, content_type, None).await
    }

    /// Same as `send`, but also sets `Accept` when `accept` is given —
    /// needed for the manifest GET, which must ask for the schema-2 media
    /// type explicitly rather than take whatever the registry defaults to.
    pub async fn send_accepting(
        &self,
        method: HttpMethod,
        path_or_url: &str,
        body: Option<Bytes>,
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> Result<HttpResponse> {
        let url = self.resolve(path_or_url)?;
        let mut request = self.client.request(method.into(), url);
        if let Some(ct) = content_type {
            request = request.header(CONTENT_TYPE, HeaderValue::from_str(ct).expect("content type is a valid header value"));
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, HeaderValue::from_str(accept).expect("accept is a valid header value"));
        }
        request = match body {
            // reqwest derives Content-Length from the body itself; setting
            // it explicitly here too would add a duplicate header.
            Some(bytes) => request.body(bytes),
            // No body means reqwest sends none at all, but §4.4 requires a
            // literal `Content-Length: 0` on several empty-body requests
            // (open-session, finalize), so it is set explicitly here.
            None => request.header(CONTENT_LENGTH, 0),
        };
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, headers, body })
    }

    /// The single retry loop shared by C4 and C5: retries both transport
    /// errors and retriable statuses (408/429/5xx), honoring `Retry-After`
    /// when present, up to `policy.max_attempts`. Non-retriable statuses
    /// and errors return on the first attempt.
    pub async fn send_with_retry<F, Fut>(
        policy: &RetryPolicy,
        logger: &Logger,
        op_name: &str,
        mut make_request: F,
    ) -> Result<HttpResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpResponse>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match make_request().await {
                Ok(resp) if is_retriable_status(resp.status) && attempt < policy.max_attempts => {
                    let wait = resp.retry_after().unwrap_or_else(|| policy.backoff_for(attempt));
                    logger.detail(&format!(
                        "{} attempt {} got status {}, retrying in {:?}",
                        op_name, attempt, resp.status, wait
                    ));
                    tokio::time::sleep(wait).await;
                }
                Ok(resp) => return Ok(resp),
                Err(err) if attempt < policy.max_attempts && crate::error::is_transient(&err) => {
                    let wait = policy.backoff_for(attempt);
                    logger.detail(&format!("{} attempt {} failed ({}), retrying in {:?}", op_name, attempt, err, wait));
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
