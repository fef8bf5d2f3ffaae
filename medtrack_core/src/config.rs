//! Configuration file support for medtrack.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/medtrack/config.toml`.

use crate::{DosePolicy, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub defaults: PolicyDefaults,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Policy used by `add-med` when the user leaves a limit out
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyDefaults {
    #[serde(default = "default_min_interval_hours")]
    pub min_interval_hours: u32,

    #[serde(default = "default_max_doses_per_day")]
    pub max_doses_per_day: u32,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            min_interval_hours: default_min_interval_hours(),
            max_doses_per_day: default_max_doses_per_day(),
        }
    }
}

impl PolicyDefaults {
    /// Fill in missing limits and validate the result
    pub fn policy(
        &self,
        min_interval_hours: Option<u32>,
        max_doses_per_day: Option<u32>,
    ) -> Result<DosePolicy> {
        DosePolicy::new(
            min_interval_hours.unwrap_or(self.min_interval_hours),
            max_doses_per_day.unwrap_or(self.max_doses_per_day),
        )
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("medtrack")
}

fn default_min_interval_hours() -> u32 {
    4
}

fn default_max_doses_per_day() -> u32 {
    4
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject defaults that could never produce a valid policy
    pub fn validate(&self) -> Result<()> {
        if self.defaults.max_doses_per_day == 0 {
            return Err(Error::Config(
                "defaults.max_doses_per_day must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("medtrack")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.min_interval_hours, 4);
        assert_eq!(config.defaults.max_doses_per_day, 4);
        assert!(config.data.data_dir.ends_with("medtrack"));
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.defaults.min_interval_hours = 6;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.defaults.min_interval_hours, 6);
        assert_eq!(loaded.data.data_dir, config.data.data_dir);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[defaults]
max_doses_per_day = 2
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.defaults.max_doses_per_day, 2);
        assert_eq!(config.defaults.min_interval_hours, 4); // default
    }

    #[test]
    fn test_zero_cap_rejected_on_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[defaults]\nmax_doses_per_day = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_policy_defaults_fill_gaps() {
        let defaults = PolicyDefaults::default();
        let policy = defaults.policy(Some(8), None).unwrap();
        assert_eq!(policy.min_interval_hours, 8);
        assert_eq!(policy.max_doses_per_day, 4);
        assert!(defaults.policy(None, Some(0)).is_err());
    }
}
