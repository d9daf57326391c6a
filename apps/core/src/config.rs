use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hotkey::{parse_hotkey, HotkeyParseError, DEFAULT_HOTKEY};
use crate::search::RESULT_CAP;

const APP_DIR_NAME: &str = "Searchything";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("max_results must be between 5 and 100, got {0}")]
    MaxResultsOutOfRange(u16),
    #[error("invalid hotkey: {0}")]
    Hotkey(#[from] HotkeyParseError),
    #[error("unknown log level '{0}'")]
    LogLevel(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hotkey: String,
    pub max_results: u16,
    /// Folders walked for shortcuts. Empty means the Start Menu folders.
    pub shortcut_roots: Vec<PathBuf>,
    pub log_level: String,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: DEFAULT_HOTKEY.to_string(),
            max_results: RESULT_CAP as u16,
            shortcut_roots: Vec::new(),
            log_level: "info".to_string(),
            config_path: default_config_path(),
        }
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }
    std::env::temp_dir().join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    stable_app_data_dir().join(CONFIG_FILE_NAME)
}

/// Reads the config at `path` (or the default location). A missing file
/// yields the defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let mut cfg = match fs::read_to_string(&path) {
        Ok(text) => toml::from_str::<Config>(&text)?,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    cfg.config_path = path;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(cfg)?;
    if let Some(parent) = cfg.config_path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&cfg.config_path, text).map_err(|source| ConfigError::Io {
        path: cfg.config_path.clone(),
        source,
    })
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.max_results < 5 || cfg.max_results > 100 {
        return Err(ConfigError::MaxResultsOutOfRange(cfg.max_results));
    }

    parse_hotkey(&cfg.hotkey)?;

    match cfg.log_level.to_ascii_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
        _ => Err(ConfigError::LogLevel(cfg.log_level.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_launcher_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.hotkey, "Ctrl+Space");
        assert_eq!(cfg.max_results, 50);
        assert!(cfg.shortcut_roots.is_empty());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: Config = toml::from_str("max_results = 20").unwrap();
        assert_eq!(cfg.max_results, 20);
        assert_eq!(cfg.hotkey, DEFAULT_HOTKEY);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn app_data_dir_is_namespaced() {
        assert!(stable_app_data_dir().ends_with(APP_DIR_NAME));
    }
}
