use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const DEFAULT_CATALOG_URL: &str =
    "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items";
pub const DEFAULT_DATA_DIR: &str = "cms_data";
pub const DEFAULT_METADATA_FILE: &str = "last_run_metadata.json";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_TITLE_MARKER: &str = "Hospital";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const DEFAULT_CONFIG_FILE: &str = "cms-sync.json";

/// On-disk config file. Every field is optional and falls back to the
/// built-in default.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub metadata_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub title_marker: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Command-line values layered over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub catalog_url: Option<String>,
    pub data_dir: Option<Utf8PathBuf>,
    pub metadata_file: Option<Utf8PathBuf>,
    pub workers: Option<usize>,
    pub title_marker: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConfig {
    pub catalog_url: String,
    pub data_dir: Utf8PathBuf,
    pub metadata_file: Utf8PathBuf,
    pub workers: usize,
    pub title_marker: String,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            data_dir: Utf8PathBuf::from(DEFAULT_DATA_DIR),
            metadata_file: Utf8PathBuf::from(DEFAULT_METADATA_FILE),
            workers: DEFAULT_WORKERS,
            title_marker: DEFAULT_TITLE_MARKER.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `cms-sync.json` from the current directory when no
    /// path is given. A missing default file is not an error.
    pub fn resolve(
        path: Option<&Utf8Path>,
        overrides: ConfigOverrides,
    ) -> Result<SyncConfig, SyncError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.as_std_path().exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(config_path.as_std_path())
                .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| SyncError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<SyncConfig, SyncError> {
        let defaults = SyncConfig::default();
        let resolved = SyncConfig {
            catalog_url: overrides
                .catalog_url
                .or(config.catalog_url)
                .unwrap_or(defaults.catalog_url),
            data_dir: overrides
                .data_dir
                .or(config.data_dir)
                .unwrap_or(defaults.data_dir),
            metadata_file: overrides
                .metadata_file
                .or(config.metadata_file)
                .unwrap_or(defaults.metadata_file),
            workers: overrides
                .workers
                .or(config.workers)
                .unwrap_or(defaults.workers),
            title_marker: overrides
                .title_marker
                .or(config.title_marker)
                .unwrap_or(defaults.title_marker),
            timeout_secs: overrides
                .timeout_secs
                .or(config.timeout_secs)
                .unwrap_or(defaults.timeout_secs),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.workers == 0 {
            return Err(SyncError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.title_marker.is_empty() {
            return Err(SyncError::InvalidConfig(
                "title_marker must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.catalog_url.starts_with("http://") && !self.catalog_url.starts_with("https://") {
            return Err(SyncError::InvalidConfig(format!(
                "catalog_url must be an http(s) URL: {}",
                self.catalog_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_file() {
        let config = Config {
            workers: Some(2),
            title_marker: Some("Nursing".to_string()),
            ..Config::default()
        };
        let overrides = ConfigOverrides {
            workers: Some(8),
            ..ConfigOverrides::default()
        };
        let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
        assert_eq!(resolved.workers, 8);
        assert_eq!(resolved.title_marker, "Nursing");
        assert_eq!(resolved.data_dir, Utf8PathBuf::from(DEFAULT_DATA_DIR));
    }
}
