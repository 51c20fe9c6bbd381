use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ember_core::{SessionFlag, SessionFlags};
use snafu::ResultExt;

use crate::error::{ConsoleError, SerializeFlagsSnafu, WriteFlagsSnafu};

const CACHE_DIRECTORY_NAME: &str = "ember";
const FLAGS_FILE_NAME: &str = "session-flags.json";

/// Session flags kept in a JSON file so they survive between console runs.
pub struct FileFlags {
    path: PathBuf,
    values: RefCell<BTreeMap<String, bool>>,
}

impl FileFlags {
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .map(|path| path.join(CACHE_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ember"))
            .join(FLAGS_FILE_NAME)
    }

    /// Loads flags from `path`; `fresh` discards whatever an earlier run left behind.
    pub fn open(path: PathBuf, fresh: bool) -> Self {
        let values = if fresh {
            match std::fs::remove_file(&path) {
                Err(error) if error.kind() != std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = ?path, error = %error, "failed to reset session flags");
                }
                _ => {}
            }
            BTreeMap::new()
        } else {
            Self::load(&path)
        };

        Self {
            path,
            values: RefCell::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, bool> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to read session flags");
                return BTreeMap::new();
            }
        };

        serde_json::from_str::<BTreeMap<String, bool>>(&content).unwrap_or_else(|error| {
            tracing::warn!(path = ?path, error = %error, "ignoring unreadable session flags");
            BTreeMap::new()
        })
    }

    fn persist(&self) -> Result<(), ConsoleError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(WriteFlagsSnafu {
                stage: "create-flags-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(&*self.values.borrow()).context(
            SerializeFlagsSnafu {
                stage: "serialize-flags",
            },
        )?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFlagsSnafu {
            stage: "write-temporary-flags-file",
            path: temp_path.clone(),
        })?;
        std::fs::rename(&temp_path, &self.path).context(WriteFlagsSnafu {
            stage: "rename-temporary-flags-file",
            path: self.path.clone(),
        })?;
        Ok(())
    }
}

impl SessionFlags for FileFlags {
    fn get(&self, flag: SessionFlag) -> bool {
        self.values
            .borrow()
            .get(flag.key())
            .copied()
            .unwrap_or(false)
    }

    fn set(&self, flag: SessionFlag, value: bool) {
        self.values
            .borrow_mut()
            .insert(flag.key().to_string(), value);
        if let Err(error) = self.persist() {
            tracing::warn!(key = flag.key(), error = %error, "failed to persist session flag");
        }
    }
}
