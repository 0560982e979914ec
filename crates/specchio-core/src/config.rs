use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::log::LogConfig;

/// Top-level configuration for Specchio.
///
/// Loaded from `~/.config/specchio/config.toml`. Missing sections fall back
/// to defaults thanks to `#[serde(default)]`. Configuration only tunes
/// ambient behavior (logging); the shared-region protocol itself is fixed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File logging settings.
    pub log: LogConfig,
}

/// Returns the config directory: `~/.config/specchio/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config").join("specchio"))
}

/// Returns the config file path: `~/.config/specchio/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Tries to load and parse `config.toml`.
///
/// Returns `Ok(Config)` on success, or an error string describing what went
/// wrong (IO error, parse error, etc.).
pub fn try_load() -> Result<Config, String> {
    let path = config_path().ok_or("could not determine config path")?;
    let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    let config: Config = toml::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(config)
}

/// Loads the configuration from disk, falling back to defaults.
///
/// A missing or unparseable file returns defaults: a broken config must
/// never keep the publisher from starting.
pub fn load() -> Config {
    try_load().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_logging_disabled() {
        let config = Config::default();

        assert!(!config.log.enabled);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.max_file_mb, 10);
    }

    #[test]
    fn parses_log_section() {
        let config: Config = toml::from_str(
            r#"
            [log]
            enabled = true
            level = "debug"
            max_file_mb = 5
            "#,
        )
        .expect("valid config");

        assert!(config.log.enabled);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.max_file_mb, 5);
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let config: Config = toml::from_str("").expect("empty config");

        assert!(!config.log.enabled);
    }

    #[test]
    fn config_path_is_under_config_dir() {
        // Only holds on machines with a resolvable home directory.
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
            assert!(path.parent().unwrap().ends_with("specchio"));
        }
    }
}
