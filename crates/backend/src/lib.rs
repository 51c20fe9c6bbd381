use std::rc::Rc;

mod backend;
mod http;
mod wire;

pub use backend::{
    Backend, BackendConfig, BackendError, BackendResult, DEFAULT_CHAT_ENDPOINT,
    DEFAULT_REINDEX_ENDPOINT,
};
pub use http::HttpBackend;
pub use wire::{ChatRequest, decode_answer, decode_summary};

/// Builds the default HTTP backend for a deployment.
pub fn create_backend(config: BackendConfig) -> BackendResult<Rc<dyn Backend>> {
    tracing::debug!(
        chat_url = %config.chat_url(),
        reindex_url = %config.reindex_url(),
        "creating http backend"
    );
    Ok(Rc::new(HttpBackend::new(config)?))
}
