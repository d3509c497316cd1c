use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub fetch: FetchSettings,
    pub retry: RetrySettings,
    pub checkpoint: CheckpointSettings,
}

/// Settings shared by all fetch backends
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FetchSettings {
    /// User agent sent by the HTTP backend
    pub user_agent: String,

    /// Whole-request timeout for plain HTTP fetches, in seconds
    pub http_timeout_secs: u64,

    /// Deadline for a browser navigation to reach a loaded document, in seconds
    pub nav_timeout_secs: u64,

    /// Extra wait after the document loads, for script-driven rendering,
    /// in milliseconds
    pub settle_delay_ms: u64,

    /// WebDriver endpoint for the webdriver backend
    pub webdriver_url: String,

    /// Run browser backends headless
    pub headless: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            http_timeout_secs: 10,
            nav_timeout_secs: 30,
            settle_delay_ms: 2000,
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
        }
    }
}

/// Retry behavior for per-page fetches
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetrySettings {
    /// Total attempts per page, including the first
    pub max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

/// Checkpoint persistence settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckpointSettings {
    /// Checkpoint file location; None uses the platform data directory
    pub path: Option<PathBuf>,

    /// Save a checkpoint every N processed pages; None disables automatic
    /// checkpointing entirely
    pub every_pages: Option<u32>,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            path: None,
            every_pages: Some(3),
        }
    }
}

impl CheckpointSettings {
    /// Resolve the checkpoint file path, falling back to the platform data
    /// directory.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let mut path = if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "page-harvester", "page-harvester")
        {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from("./data")
        };
        path.push("checkpoint.json");
        path
    }
}

impl AppConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let path = if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "page-harvester", "page-harvester")
        {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path
    }

    /// Load the default configuration, creating it on first run
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_as_default()?;
            Ok(config)
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        let config_path = Self::config_dir().join("default.yaml");
        self.save_to_file(&config_path)
    }

    /// Save the configuration to a file
    fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.checkpoint.every_pages, Some(3));
        assert!(config.fetch.headless);
    }

    #[test]
    fn test_config_roundtrips_through_yaml() {
        let mut config = AppConfig::default();
        config.checkpoint.every_pages = None;
        config.fetch.http_timeout_secs = 42;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.checkpoint.every_pages, None);
        assert_eq!(back.fetch.http_timeout_secs, 42);
    }

    #[test]
    fn test_explicit_checkpoint_path_wins() {
        let settings = CheckpointSettings {
            path: Some(PathBuf::from("/tmp/cp.json")),
            every_pages: Some(5),
        };
        assert_eq!(settings.resolved_path(), PathBuf::from("/tmp/cp.json"));
    }
}
