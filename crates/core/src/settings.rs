use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use ember_backend::{BackendConfig, DEFAULT_CHAT_ENDPOINT, DEFAULT_REINDEX_ENDPOINT};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::bridge::Origin;
use crate::reindex::ReindexTexts;
use crate::session::SessionTexts;
use crate::visibility::DEFAULT_AUTO_OPEN_RATIO;

pub const SETTINGS_DIRECTORY_NAME: &str = "ember";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "EMBER_";

pub const DEFAULT_PLACEHOLDER_TEXT: &str = "Thinking…";
pub const DEFAULT_ERROR_TEXT: &str =
    "Sorry, I couldn't get an answer right now. Please try again in a moment.";
pub const DEFAULT_REINDEX_PROMPT: &str =
    "Rebuild the assistant's knowledge base now? This can take a few minutes.";
pub const DEFAULT_REINDEX_PLACEHOLDER_TEXT: &str = "Reindexing the knowledge base…";
pub const DEFAULT_REINDEX_FAILURE_TEXT: &str =
    "Reindexing failed. The knowledge base was not changed.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSettings {
    /// Base URL for relative endpoints; empty means same origin.
    #[serde(default)]
    pub backend_url: String,
    #[serde(default = "default_chat_endpoint")]
    pub chat_endpoint: String,
    #[serde(default = "default_reindex_endpoint")]
    pub reindex_endpoint: String,
    /// Page loaded into a nested frame as the chat surface. Inline surface when unset.
    #[serde(default)]
    pub surface_url: Option<String>,
    #[serde(default)]
    pub surface_origin: Option<String>,
    #[serde(default = "default_auto_open_ratio")]
    pub auto_open_ratio: f64,
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
    #[serde(default = "default_error_text")]
    pub error_text: String,
    #[serde(default = "default_reindex_prompt")]
    pub reindex_prompt: String,
    #[serde(default = "default_reindex_placeholder_text")]
    pub reindex_placeholder_text: String,
    #[serde(default = "default_reindex_failure_text")]
    pub reindex_failure_text: String,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            chat_endpoint: default_chat_endpoint(),
            reindex_endpoint: default_reindex_endpoint(),
            surface_url: None,
            surface_origin: None,
            auto_open_ratio: default_auto_open_ratio(),
            placeholder_text: default_placeholder_text(),
            error_text: default_error_text(),
            reindex_prompt: default_reindex_prompt(),
            reindex_placeholder_text: default_reindex_placeholder_text(),
            reindex_failure_text: default_reindex_failure_text(),
            greeting: None,
            admin: false,
        }
    }
}

impl WidgetSettings {
    /// Defaults, then the JSON file when present, then `EMBER_*` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(WidgetSettings::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Defaults overlaid with loose key/value overrides, e.g. script tag attributes.
    pub fn from_overrides(
        overrides: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, SettingsError> {
        let settings = Figment::from(Serialized::defaults(WidgetSettings::default()))
            .merge(Serialized::defaults(overrides))
            .extract::<WidgetSettings>()
            .context(ExtractSnafu {
                stage: "extract-override-settings",
            })?;
        Ok(settings.normalized())
    }

    pub fn extract(figment: &Figment) -> Result<Self, SettingsError> {
        let settings = figment.extract::<WidgetSettings>().context(ExtractSnafu {
            stage: "extract-settings",
        })?;
        Ok(settings.normalized())
    }

    pub fn normalized(mut self) -> Self {
        self.backend_url = self.backend_url.trim().trim_end_matches('/').to_string();
        self.chat_endpoint = non_blank_or(self.chat_endpoint, default_chat_endpoint);
        self.reindex_endpoint = non_blank_or(self.reindex_endpoint, default_reindex_endpoint);
        self.surface_url = non_blank(self.surface_url);
        self.surface_origin = non_blank(self.surface_origin);
        if !(self.auto_open_ratio.is_finite() && self.auto_open_ratio >= 0.0) {
            self.auto_open_ratio = default_auto_open_ratio();
        }
        self.placeholder_text = non_blank_or(self.placeholder_text, default_placeholder_text);
        self.error_text = non_blank_or(self.error_text, default_error_text);
        self.reindex_prompt = non_blank_or(self.reindex_prompt, default_reindex_prompt);
        self.reindex_placeholder_text = non_blank_or(
            self.reindex_placeholder_text,
            default_reindex_placeholder_text,
        );
        self.reindex_failure_text =
            non_blank_or(self.reindex_failure_text, default_reindex_failure_text);
        self.greeting = non_blank(self.greeting);
        self
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::new(
            &self.backend_url,
            &self.chat_endpoint,
            &self.reindex_endpoint,
        )
    }

    /// Origin the chat surface lives on: explicit, derived from the frame URL, or the
    /// page's own origin for inline surfaces.
    pub fn resolve_surface_origin(&self, page_origin: &str) -> Option<Origin> {
        if let Some(origin) = &self.surface_origin {
            return Origin::parse(origin);
        }

        match &self.surface_url {
            Some(url) if url.contains("://") => Origin::from_url(url),
            _ => Origin::parse(page_origin),
        }
    }

    pub fn session_texts(&self) -> SessionTexts {
        SessionTexts {
            placeholder: self.placeholder_text.clone(),
            error: self.error_text.clone(),
        }
    }

    pub fn reindex_texts(&self) -> ReindexTexts {
        ReindexTexts {
            prompt: self.reindex_prompt.clone(),
            placeholder: self.reindex_placeholder_text.clone(),
            failure: self.reindex_failure_text.clone(),
        }
    }
}

/// Current settings plus their on-disk location.
pub struct SettingsStore {
    settings: Arc<ArcSwap<WidgetSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ember"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<WidgetSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: WidgetSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> WidgetSettings {
        let source = if path.exists() {
            Some(path)
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            None
        };

        match WidgetSettings::extract(&WidgetSettings::figment(source)) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                WidgetSettings::default()
            }
        }
    }

    fn persist(&self, settings: &WidgetSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to extract settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_chat_endpoint() -> String {
    DEFAULT_CHAT_ENDPOINT.to_string()
}

fn default_reindex_endpoint() -> String {
    DEFAULT_REINDEX_ENDPOINT.to_string()
}

fn default_auto_open_ratio() -> f64 {
    DEFAULT_AUTO_OPEN_RATIO
}

fn default_placeholder_text() -> String {
    DEFAULT_PLACEHOLDER_TEXT.to_string()
}

fn default_error_text() -> String {
    DEFAULT_ERROR_TEXT.to_string()
}

fn default_reindex_prompt() -> String {
    DEFAULT_REINDEX_PROMPT.to_string()
}

fn default_reindex_placeholder_text() -> String {
    DEFAULT_REINDEX_PLACEHOLDER_TEXT.to_string()
}

fn default_reindex_failure_text() -> String {
    DEFAULT_REINDEX_FAILURE_TEXT.to_string()
}
