use futures::future::LocalBoxFuture;
use snafu::Snafu;

use crate::wire::ChatRequest;

pub const DEFAULT_CHAT_ENDPOINT: &str = "/chat";
pub const DEFAULT_REINDEX_ENDPOINT: &str = "/reindex";

/// Endpoints of one assistant deployment.
///
/// Relative paths are resolved against `base_url` when one is set, which is how the
/// console host talks to a remote deployment while the browser host stays same-origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub chat_endpoint: String,
    pub reindex_endpoint: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            chat_endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            reindex_endpoint: DEFAULT_REINDEX_ENDPOINT.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn new(
        base_url: impl Into<String>,
        chat_endpoint: impl Into<String>,
        reindex_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            chat_endpoint: chat_endpoint.into().trim().to_string(),
            reindex_endpoint: reindex_endpoint.into().trim().to_string(),
        }
    }

    pub fn chat_url(&self) -> String {
        self.resolve(&self.chat_endpoint)
    }

    pub fn reindex_url(&self) -> String {
        self.resolve(&self.reindex_endpoint)
    }

    fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }

        if self.base_url.is_empty() {
            return endpoint.to_string();
        }

        if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("http client failed to build on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{url} returned status {status}: {body}"))]
    Status {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response body on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("response body has no usable `{field}` field"))]
    MissingField {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("backend rejected the request: {message}"))]
    Rejected {
        stage: &'static str,
        message: String,
    },
}

/// Remote assistant contract used by the chat and reindex flows.
///
/// Futures are not `Send`: the widget runs on a single cooperative event loop.
pub trait Backend {
    fn ask<'a>(&'a self, request: ChatRequest) -> LocalBoxFuture<'a, BackendResult<String>>;
    fn reindex<'a>(&'a self) -> LocalBoxFuture<'a, BackendResult<String>>;
}
