use rv_core::{PageSize, PaginationConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for reduce-viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub pagination: PaginationSettings,

    #[serde(default)]
    pub submission: SubmissionConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Base URL of the job submission API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one folder per instrument with its reduction scripts
    #[serde(default = "default_scripts_root")]
    pub scripts_root: PathBuf,

    #[serde(default = "default_data_analysis_base_url")]
    pub data_analysis_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            pagination: PaginationSettings::default(),
            submission: SubmissionConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_only: false,
        }
    }
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            tolerance: default_tolerance(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scripts_root: default_scripts_root(),
            data_analysis_base_url: default_data_analysis_base_url(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_page_size() -> usize {
    10
}

fn default_tolerance() -> usize {
    3
}

fn default_api_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_scripts_root() -> PathBuf {
    if let Some(dirs) = project_dirs() {
        dirs.data_dir().join("instruments")
    } else {
        PathBuf::from("~/.reduce-viewer/instruments")
    }
}

fn default_data_analysis_base_url() -> String {
    "https://data.analysis.stfc.ac.uk/#/browse/instrument/".to_string()
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("uk", "reduce-viewer", "reduce-viewer")
}

impl PaginationSettings {
    /// Unknown page sizes in the file fall back to 10.
    pub fn to_pagination(&self) -> PaginationConfig {
        PaginationConfig {
            default_page_size: PageSize::from_value(self.page_size).unwrap_or_default(),
            tolerance: self.tolerance,
        }
    }
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, writing the defaults there first if it does not exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            Ok(config)
        }
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = project_dirs() {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.reduce-viewer/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.pagination.page_size, 10);
        assert_eq!(config.pagination.tolerance, 3);
        assert!(!config.server.read_only);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.submission.api_url, config.submission.api_url);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.server.host, "127.0.0.1");
        assert_eq!(parsed.pagination.tolerance, 3);
    }

    #[test]
    fn test_unknown_page_size_falls_back() {
        let settings = PaginationSettings {
            page_size: 33,
            tolerance: 1,
        };
        let pagination = settings.to_pagination();
        assert_eq!(pagination.default_page_size, PageSize::Ten);
        assert_eq!(pagination.tolerance, 1);
    }

    #[test]
    fn test_load_from_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 8000);

        std::fs::write(&path, "[pagination]\npage_size = 25\n").unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.pagination.to_pagination().default_page_size, PageSize::TwentyFive);
    }
}
