//! Blocking fetches for URL-located entries.
//!
//! Every fetch is bounded: a connect timeout, a total timeout, a size cap,
//! and a [`CancelToken`] checked between body chunks. Failures are
//! classified so callers can tell a dead host from a slow one.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::BundleConfig;
use crate::xml::decode_xml_bytes;

/// Body read chunk size
const CHUNK_SIZE: usize = 64 * 1024;

/// Network failures, classified
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Could not resolve host for {url}: {message}")]
    Dns { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },

    #[error("{url} exceeds the {limit} byte fetch limit")]
    TooLarge { url: String, limit: u64 },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether retrying later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Shared cancellation flag for in-flight fetches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking HTTP client configured from a [`BundleConfig`]
pub struct Fetcher {
    client: Client,
    max_bytes: u64,
}

impl Fetcher {
    pub fn new(config: &BundleConfig) -> Result<Self, FetchError> {
        Self::build(config, true)
    }

    fn build(config: &BundleConfig, use_proxy: bool) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.fetch_timeout);
        if !use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_bytes: config.max_fetch_bytes,
        })
    }

    /// Fetch the full body of `url`.
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_bytes_cancellable(url, &CancelToken::new())
    }

    pub fn fetch_bytes_cancellable(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: url.to_string() });
        }

        debug!("Fetching {}", truncate_url(url));
        let mut response = self
            .client
            .get(parsed)
            .send()
            .map_err(|e| classify(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        let mut body = Vec::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                warn!("Fetch cancelled: {}", truncate_url(url));
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            let read = response
                .read(&mut chunk)
                .map_err(|e| classify_io(url, &e))?;
            if read == 0 {
                break;
            }
            if body.len() as u64 + read as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk[..read]);
        }

        debug!("Fetched {} bytes from {}", body.len(), truncate_url(url));
        Ok(body)
    }

    /// Fetch `url` as text. Byte-order marks are honoured; invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_text_cancellable(url, &CancelToken::new())
    }

    pub fn fetch_text_cancellable(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        let bytes = self.fetch_bytes_cancellable(url, cancel)?;
        Ok(decode_xml_bytes(&bytes)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn classify(url: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout { url: url.to_string() };
    }
    let message = error_chain(error);
    if error.is_connect() && looks_like_dns(&message) {
        return FetchError::Dns {
            url: url.to_string(),
            message,
        };
    }
    if let Some(status) = error.status() {
        return FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        };
    }
    FetchError::Transport {
        url: url.to_string(),
        message,
    }
}

fn classify_io(url: &str, error: &std::io::Error) -> FetchError {
    let inner_timeout = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(|e| e.is_timeout());
    if inner_timeout || error.kind() == std::io::ErrorKind::TimedOut {
        return FetchError::Timeout { url: url.to_string() };
    }
    FetchError::Transport {
        url: url.to_string(),
        message: error.to_string(),
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn looks_like_dns(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["dns", "lookup", "resolve", "name or service not known", "no such host"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Truncate URL for logging (hide query tokens)
fn truncate_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
