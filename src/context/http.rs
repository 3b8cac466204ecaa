//! Outbound HTTP for function bodies.

use crate::runtime::limiter::ResourceLimiter;
use crate::utils::{HarnessError, LimitKind, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Per-request timeout; always clamped to the run's remaining time.
    pub timeout_ms: Option<u64>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: "GET".into(), url: url.into(), headers: Vec::new(), body: None, timeout_ms: None }
    }

    pub fn post_json<T: Serialize>(url: impl Into<String>, body: &T) -> Result<Self> {
        let body = serde_json::to_vec(body).map_err(|e| HarnessError::Http(e.to_string()))?;
        Ok(Self {
            method: "POST".into(),
            url: url.into(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(body),
            timeout_ms: None,
        })
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Bytes sent on the wire, as counted against the upload ceiling.
    pub fn upload_size(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.url.len() + headers + self.body.as_ref().map_or(0, Vec::len)) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HarnessError::Http(format!("status {}", self.status)))
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| HarnessError::Http(format!("invalid json body: {e}")))
    }
}

/// Raw HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Bodies longer than `max_body` fail with a `Download` limit error whose
    /// `used` is the number of bytes seen (or declared) when reading stopped.
    async fn send(&self, request: HttpRequest, max_body: u64) -> Result<HttpResponse>;
}

/// HTTP transport backed by reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest, max_body: u64) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| HarnessError::Http(format!("invalid method {}: {e}", request.method)))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(ms) = request.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let mut response = builder.send().await.map_err(|e| HarnessError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let too_large = |used| HarnessError::LimitExceeded { limit: LimitKind::Download, used, max: max_body };
        if let Some(declared) = response.content_length().filter(|len| *len > max_body) {
            return Err(too_large(declared));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| HarnessError::Http(e.to_string()))? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > max_body {
                return Err(too_large(body.len() as u64));
            }
        }
        Ok(HttpResponse { status, body })
    }
}

/// HTTP capability handed to function bodies.
#[async_trait]
pub trait HttpAccess: Send + Sync + 'static {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Host-side HTTP access: charges the limiter around a raw client.
pub struct LimitedHttp {
    client: Arc<dyn HttpClient>,
    limiter: Arc<ResourceLimiter>,
}

impl LimitedHttp {
    pub fn new(client: Arc<dyn HttpClient>, limiter: Arc<ResourceLimiter>) -> Self {
        Self { client, limiter }
    }
}

#[async_trait]
impl HttpAccess for LimitedHttp {
    async fn fetch(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        self.limiter.begin_request(request.upload_size())?;
        let remaining = self.limiter.remaining().as_millis() as u64;
        request.timeout_ms = Some(request.timeout_ms.map_or(remaining, |ms| ms.min(remaining)));
        debug!(method = %request.method, url = %request.url, "http fetch");
        let budget = self.limiter.download_remaining();
        let response = self.client.send(request, budget).await.map_err(|err| match err {
            // charge what was read so the run-wide totals land in the error
            HarnessError::LimitExceeded { limit: LimitKind::Download, used, .. } => {
                self.limiter.record_download(used).err().unwrap_or(err)
            }
            err => err,
        })?;
        self.limiter.record_download(response.body.len() as u64)?;
        Ok(response)
    }
}

/// HTTP facade exposed on the execution context.
#[derive(Clone)]
pub struct Http {
    inner: Arc<dyn HttpAccess>,
}

impl Http {
    pub fn new(inner: Arc<dyn HttpAccess>) -> Self {
        Self { inner }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.inner.fetch(HttpRequest::get(url)).await
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.inner.fetch(request).await
    }
}
