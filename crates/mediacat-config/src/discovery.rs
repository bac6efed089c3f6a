//! Discovers `.mediacat/config.toml`, walking upward from the current
//! directory the way the teacher discovers `.xchecker/config.toml`, with a
//! `MEDIACAT_HOME` override taking precedence over the walk.
//!
//! Precedence (highest to lowest): explicit path argument > `MEDIACAT_HOME`
//! env var > discovered `.mediacat/config.toml` > built-in defaults.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

use crate::model::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

const CONFIG_DIR: &str = ".mediacat";
const CONFIG_FILE: &str = "config.toml";
const HOME_ENV_VAR: &str = "MEDIACAT_HOME";

fn candidate_from_dir(dir: &Utf8Path) -> Utf8PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Walk upward from `start` looking for `.mediacat/config.toml`.
fn discover_upward(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut dir = Some(start.to_owned());
    while let Some(current) = dir {
        let candidate = candidate_from_dir(&current);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = current.parent().map(|p| p.to_owned());
    }
    None
}

fn load_from_path(path: &Utf8Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

impl Config {
    /// Discover configuration using the precedence documented above,
    /// falling back to built-in defaults when nothing is found.
    pub fn discover(explicit_path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            return load_from_path(path);
        }

        if let Ok(home) = std::env::var(HOME_ENV_VAR) {
            let candidate = candidate_from_dir(Utf8Path::new(&home));
            if candidate.exists() {
                return load_from_path(&candidate);
            }
        }

        let cwd = std::env::current_dir().ok().and_then(|p| Utf8PathBuf::from_path_buf(p).ok());
        if let Some(cwd) = cwd
            && let Some(found) = discover_upward(&cwd)
        {
            return load_from_path(&found);
        }

        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discover_falls_back_to_defaults_when_nothing_found() {
        let dir = tempdir().unwrap();
        let empty = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        // No .mediacat/config.toml anywhere under this isolated temp root.
        let found = discover_upward(&empty);
        assert!(found.is_none());
    }

    #[test]
    fn explicit_path_loads_toml() {
        let dir = tempdir().unwrap();
        let cfg_dir = dir.path().join(".mediacat");
        fs::create_dir_all(&cfg_dir).unwrap();
        let cfg_path = cfg_dir.join("config.toml");
        fs::write(&cfg_path, "[thresholds]\nhigh_confidence_threshold = 85\n").unwrap();

        let path = Utf8PathBuf::from_path_buf(cfg_path).unwrap();
        let config = Config::discover(Some(&path)).unwrap();
        assert_eq!(config.thresholds.high_confidence_threshold, 85);
    }
}
