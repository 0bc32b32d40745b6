//! Byte fetching abstraction for testability.
//!
//! The loader never talks to the network directly; it goes through a
//! [`Fetcher`], which lets tests and embedding applications substitute
//! in-memory sources.

use super::error::FetchError;
use bytes::Bytes;
use dashmap::DashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tracing::trace;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches raw bytes for a URL.
///
/// The token is opaque and passed through unchanged.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Bytes, FetchError>>;
}

/// HTTP(S) fetcher backed by `reqwest`.
///
/// Tokens are appended as a `token` query parameter.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let mut request = self.client.get(url);
            if let Some(token) = token {
                request = request.query(&[("token", token)]);
            }

            let response = request.send().await.map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })?;
            trace!(url, bytes = body.len(), "Fetched");
            Ok(body)
        })
    }
}

/// Reads `file://` URLs and plain paths from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_for(url: &str) -> Result<PathBuf, FetchError> {
        if url.starts_with("file://") {
            reqwest::Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))
        } else {
            Ok(PathBuf::from(url))
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        _token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let path = Self::path_for(url)?;
            let data = tokio::fs::read(&path)
                .await
                .map_err(|source| FetchError::Io { path, source })?;
            Ok(Bytes::from(data))
        })
    }
}

/// Routes `http(s)://` URLs to [`HttpFetcher`] and everything else to
/// [`FileFetcher`].
#[derive(Clone, Debug)]
pub struct DefaultFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl DefaultFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpFetcher::new()?,
            file: FileFetcher,
        })
    }

    pub fn with_http(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher,
        }
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.http.fetch(url, token)
        } else {
            self.file.fetch(url, token)
        }
    }
}

/// A canned response for [`MemoryFetcher`].
#[derive(Clone, Debug)]
pub enum MemoryResponse {
    Body(Bytes),
    Status(u16),
    Transport(String),
}

/// In-memory fetcher serving canned responses.
///
/// Unknown URLs answer HTTP 404. Every request is counted, which makes this
/// useful for asserting how often the scheduler actually fetched.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    responses: DashMap<String, MemoryResponse>,
    hits: DashMap<String, usize>,
    latency: Option<Duration>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response, so tests can observe in-flight state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, url: impl Into<String>, response: MemoryResponse) {
        self.responses.insert(url.into(), response);
    }

    pub fn insert_body(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.insert(url, MemoryResponse::Body(body.into()));
    }

    /// Number of requests made for `url` so far.
    pub fn hits(&self, url: &str) -> usize {
        self.hits.get(url).map(|h| *h).unwrap_or(0)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        _token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        Box::pin(async move {
            *self.hits.entry(url.to_string()).or_insert(0) += 1;
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let response = self.responses.get(url).map(|r| r.value().clone());
            match response {
                Some(MemoryResponse::Body(body)) => Ok(body),
                Some(MemoryResponse::Status(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                }),
                Some(MemoryResponse::Transport(reason)) => Err(FetchError::Transport {
                    url: url.to_string(),
                    reason,
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        })
    }
}
