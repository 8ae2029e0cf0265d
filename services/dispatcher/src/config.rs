//! Dispatcher configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/banner-dispatcher/config.toml`.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_path: String,
    pub db_path: String,
    pub journal_dir: String,
    pub slot_capacity: usize,
    pub liveness_interval_secs: u64,
    pub purge_on_startup: bool,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    queue_path: Option<String>,
    db_path: Option<String>,
    journal_dir: Option<String>,
    slot_capacity: Option<usize>,
    liveness_interval_secs: Option<u64>,
    purge_on_startup: Option<bool>,
}

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from_path(Path::new("/etc/banner-dispatcher/config.toml"))
}

fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(Config {
        queue_path: raw
            .queue_path
            .unwrap_or_else(|| "/var/lib/banner-dispatcher/wtc.sqlite3".to_owned()),
        db_path: raw
            .db_path
            .unwrap_or_else(|| "/var/lib/banner-dispatcher/fixture.sqlite3".to_owned()),
        journal_dir: raw
            .journal_dir
            .unwrap_or_else(|| "/var/lib/banner-dispatcher/journals".to_owned()),
        // IPS_SLOT_0..IPS_SLOT_25 plus IPS_FLASH_MESSAGE_SEQ (support_evolution.h).
        slot_capacity: raw.slot_capacity.unwrap_or(26),
        liveness_interval_secs: raw.liveness_interval_secs.unwrap_or(300),
        purge_on_startup: raw.purge_on_startup.unwrap_or(true),
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_config_is_empty() {
        let cfg = load_config_from_str("").unwrap();
        assert_eq!(cfg.slot_capacity, 26);
        assert_eq!(cfg.liveness_interval_secs, 300);
        assert!(cfg.purge_on_startup);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = load_config_from_str(
            "queue_path = \"/tmp/wtc.sqlite3\"\nslot_capacity = 10\npurge_on_startup = false\n",
        )
        .unwrap();
        assert_eq!(cfg.queue_path, "/tmp/wtc.sqlite3");
        assert_eq!(cfg.slot_capacity, 10);
        assert!(!cfg.purge_on_startup);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = load_config_from_str("not valid = = toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
