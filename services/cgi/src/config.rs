//! CGI binary configuration loading.
//!
//! TOML is the sole config source. Default config path:
//! `/etc/banner-dispatcher/cgi.toml`.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_path: String,
    pub db_path: String,
    pub journal_dir: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    queue_path: Option<String>,
    db_path: Option<String>,
    journal_dir: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from_path(Path::new("/etc/banner-dispatcher/cgi.toml"))
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
        assert_eq!(cfg.queue_path, "/var/lib/banner-dispatcher/wtc.sqlite3");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = load_config_from_str("db_path = \"/tmp/fixture.sqlite3\"\n").unwrap();
        assert_eq!(cfg.db_path, "/tmp/fixture.sqlite3");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = load_config_from_str("not valid = = toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
