use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;

use crate::backend::{BackendResult, DecodeSnafu, MissingFieldSnafu, RejectedSnafu};

/// Canonical chat request body. The field is always `question`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChatReply {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReindexReply {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    stats: serde_json::Map<String, Value>,
}

/// Extracts the answer text from a 2xx chat response body.
pub fn decode_answer(body: &str) -> BackendResult<String> {
    let reply: ChatReply = serde_json::from_str(body).context(DecodeSnafu {
        stage: "decode-chat-reply",
    })?;

    if let Some(answer) = reply.answer.filter(|answer| !answer.trim().is_empty()) {
        return Ok(answer);
    }

    if let Some(message) = reply.error {
        return RejectedSnafu {
            stage: "chat-reply-error",
            message,
        }
        .fail();
    }

    MissingFieldSnafu {
        stage: "chat-reply-answer",
        field: "answer",
    }
    .fail()
}

/// Extracts a human readable summary from a 2xx reindex response body.
///
/// Deployments that only report counters (`{"added": 3, "chunks": 41}`) get a summary
/// rendered from their scalar fields in key order.
pub fn decode_summary(body: &str) -> BackendResult<String> {
    let reply: ReindexReply = serde_json::from_str(body).context(DecodeSnafu {
        stage: "decode-reindex-reply",
    })?;

    if let Some(summary) = reply.summary.filter(|summary| !summary.trim().is_empty()) {
        return Ok(summary);
    }

    if let Some(message) = reply.error {
        return RejectedSnafu {
            stage: "reindex-reply-error",
            message,
        }
        .fail();
    }

    let parts = reply
        .stats
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Number(number) => Some(format!("{key}: {number}")),
            Value::String(text) if !text.trim().is_empty() => Some(format!("{key}: {text}")),
            Value::Bool(flag) => Some(format!("{key}: {flag}")),
            _ => None,
        })
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return MissingFieldSnafu {
            stage: "reindex-reply-summary",
            field: "summary",
        }
        .fail();
    }

    Ok(parts.join(", "))
}
