//! Configuration file support for casadm.
//!
//! Loads an optional TOML file from `$CASADM_CONFIG`, falling back to
//! `/etc/casadm/casadm.toml`. A missing file means defaults; a broken one is
//! reported on stderr and ignored.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "CASADM_CONFIG";
pub const STATE_ENV: &str = "CASADM_STATE";
pub const SKIP_ROOT_CHECK_ENV: &str = "CASADM_SKIP_ROOT_CHECK";

const DEFAULT_CONFIG_PATH: &str = "/etc/casadm/casadm.toml";
const DEFAULT_STATE_PATH: &str = "/var/lib/casadm/engine.json";
const DEFAULT_SYSTEM_LOGS: [&str; 2] = ["/var/log/messages", "/var/log/syslog"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CasadmConfig {
    /// Where the simulated engine keeps its state between invocations.
    pub state_path: PathBuf,
    /// Append an audit line per invocation to this file.
    pub audit_log: Option<PathBuf>,
    /// System logs probed for kernel messages after a failed command.
    pub system_logs: Vec<PathBuf>,
    pub require_root: bool,
}

impl Default for CasadmConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            audit_log: None,
            system_logs: DEFAULT_SYSTEM_LOGS.iter().map(PathBuf::from).collect(),
            require_root: true,
        }
    }
}

impl CasadmConfig {
    /// Load the configuration named by the environment, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::load_from_path(&path);
        if let Some(state) = std::env::var_os(STATE_ENV).filter(|s| !s.is_empty()) {
            config.state_path = PathBuf::from(state);
        }
        config
    }

    /// Load config from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[casadm][warn] {e}");
                Self::default()
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The privilege check applies unless disabled here or by
    /// `CASADM_SKIP_ROOT_CHECK=1`.
    pub fn root_check_enabled(&self) -> bool {
        self.require_root && std::env::var(SKIP_ROOT_CHECK_ENV).as_deref() != Ok("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CasadmConfig::default();
        assert_eq!(config.state_path, PathBuf::from("/var/lib/casadm/engine.json"));
        assert!(config.audit_log.is_none());
        assert_eq!(config.system_logs.len(), 2);
        assert!(config.require_root);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().expect("temp dir");
        let config = CasadmConfig::load_from_path(&temp.path().join("casadm.toml"));
        assert_eq!(config, CasadmConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("casadm.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        writeln!(
            file,
            r#"
audit_log = "/var/log/casadm.log"
require_root = false
"#
        )
        .expect("write config");

        let config = CasadmConfig::load_from_path(&path);
        assert_eq!(config.audit_log, Some(PathBuf::from("/var/log/casadm.log")));
        assert!(!config.require_root);
        assert_eq!(config.state_path, PathBuf::from("/var/lib/casadm/engine.json"));
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("casadm.toml");
        std::fs::write(&path, "require_root = \"maybe\"").expect("write config");

        assert!(matches!(CasadmConfig::read(&path), Err(ConfigError::Parse { .. })));
        assert_eq!(CasadmConfig::load_from_path(&path), CasadmConfig::default());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("casadm.toml");
        std::fs::write(&path, "state_path = \"/from/file.json\"\n").expect("write config");

        unsafe {
            std::env::set_var(CONFIG_ENV, &path);
            std::env::set_var(STATE_ENV, temp.path().join("engine.json"));
            std::env::set_var(SKIP_ROOT_CHECK_ENV, "1");
        }
        let config = CasadmConfig::load();
        assert_eq!(config.state_path, temp.path().join("engine.json"));
        assert!(!config.root_check_enabled());

        unsafe {
            std::env::remove_var(STATE_ENV);
            std::env::remove_var(SKIP_ROOT_CHECK_ENV);
        }
        let config = CasadmConfig::load();
        assert_eq!(config.state_path, PathBuf::from("/from/file.json"));
        assert!(config.root_check_enabled());

        unsafe { std::env::remove_var(CONFIG_ENV) };
    }
}
