//! JSON fetch seam: one unauthenticated GET per URL, bounded by a timeout.

use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors from a single JSON fetch. The display text is what ends up in an
/// endpoint's `baseline_error` / `target_error` field.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid JSON: {0}")]
    Decode(String),
}

/// Anything that can turn a URL into a decoded JSON document.
pub trait JsonSource: Send + Sync {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// Blocking HTTP implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    client: Client,
}

impl HttpJsonSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl JsonSource for HttpJsonSource {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
