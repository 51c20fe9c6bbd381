use futures::future::LocalBoxFuture;
use snafu::ResultExt;

use crate::backend::{
    Backend, BackendConfig, BackendResult, BuildClientSnafu, StatusSnafu, TransportSnafu,
};
use crate::wire::{ChatRequest, decode_answer, decode_summary};

/// Longest slice of a failing response body kept in error messages.
const ERROR_BODY_PREVIEW_CHARS: usize = 256;

/// JSON-over-HTTP backend.
pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder().build().context(BuildClientSnafu {
            stage: "http-backend-new",
        })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn post(&self, url: String, body: Option<&ChatRequest>) -> BackendResult<String> {
        let mut request = self.client.post(url.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context(TransportSnafu {
            stage: "send-request",
            url: url.clone(),
        })?;
        let status = response.status();
        let payload = response.text().await.context(TransportSnafu {
            stage: "read-response",
            url: url.clone(),
        })?;

        if !status.is_success() {
            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                "backend answered with a non-success status"
            );
            return StatusSnafu {
                stage: "response-status",
                url,
                status: status.as_u16(),
                body: preview(&payload),
            }
            .fail();
        }

        Ok(payload)
    }
}

impl Backend for HttpBackend {
    fn ask<'a>(&'a self, request: ChatRequest) -> LocalBoxFuture<'a, BackendResult<String>> {
        Box::pin(async move {
            let payload = self.post(self.config.chat_url(), Some(&request)).await?;
            decode_answer(&payload)
        })
    }

    fn reindex<'a>(&'a self) -> LocalBoxFuture<'a, BackendResult<String>> {
        Box::pin(async move {
            let payload = self.post(self.config.reindex_url(), None).await?;
            decode_summary(&payload)
        })
    }
}

fn preview(body: &str) -> String {
    let mut preview = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect::<String>();
    if body.chars().count() > ERROR_BODY_PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}
