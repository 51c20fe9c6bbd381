use std::path::PathBuf;

use ember_backend::BackendError;
use ember_core::SettingsError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConsoleError {
    #[snafu(display("failed to start the async runtime"))]
    BuildRuntime {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display(
        "no backend URL configured; pass --backend-url or set EMBER_BACKEND_URL"
    ))]
    MissingBackendUrl { stage: &'static str },
    #[snafu(display("invalid surface origin '{origin}'"))]
    InvalidOrigin { stage: &'static str, origin: String },
    #[snafu(display("failed to create backend: {source}"))]
    CreateBackend {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to save settings: {source}"))]
    SaveSettings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("widget refused to mount"))]
    MountRefused { stage: &'static str },
    #[snafu(display("failed to read input on `{stage}`"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize session flags"))]
    SerializeFlags {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write session flags at {path:?} on `{stage}`"))]
    WriteFlags {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}
