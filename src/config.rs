//! Layered configuration for the notifier.
//!
//! Sources, later ones winning:
//! - Built-in defaults
//! - `.notifier/settings.toml`, searched upward from the current directory
//! - Environment variables prefixed with `NOTIFIER_`
//!
//! # Environment Variables
//!
//! Double underscores separate nested levels:
//! - `NOTIFIER_WATCH__EVENT_BUFFER_SIZE=65536` sets `watch.event_buffer_size`
//! - `NOTIFIER_LOGGING__DEFAULT=debug` sets `logging.default`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::watcher::{
    DEFAULT_EVENT_BUFFER_SIZE, Event, EventMask, NotifierError, NotifierResult,
};

const CONFIG_DIR: &str = ".notifier";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "NOTIFIER_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Watch installation settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Log filtering
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Event kinds installed on every kernel watch
    #[serde(default = "default_mask")]
    pub mask: Vec<Event>,

    /// Bytes read from the kernel per batch of raw events
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Descend into symlinked directories during recursive registration
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `inotify_notifier = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_mask() -> Vec<Event> {
    Event::WATCHABLE.to_vec()
}
fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mask: default_mask(),
            event_buffer_size: default_event_buffer_size(),
            follow_symlinks: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchConfig {
    /// Union of the configured kinds.
    pub fn event_mask(&self) -> EventMask {
        self.mask
            .iter()
            .fold(EventMask::empty(), |mask, event| mask | event.mask())
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> NotifierResult<Self> {
        let config_path =
            Self::find_workspace_config().unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring the environment.
    pub fn load_from(path: impl AsRef<Path>) -> NotifierResult<Self> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(|e| NotifierError::Config(Box::new(e)))
    }

    /// Find `.notifier/settings.toml` in the current directory or an ancestor.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> NotifierResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| NotifierError::Serialization(e.to_string()))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}
