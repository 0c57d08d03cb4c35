//! Configuration loader and validator for the likes listener.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub youtube: YouTube,
    pub fcm: Fcm,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_secs: u64,
}

/// YouTube Data API credentials and limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct YouTube {
    pub api_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub page_size: u32,
}

/// Firebase Cloud Messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fcm {
    pub server_key: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }

    if cfg.youtube.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("youtube.api_key must be non-empty"));
    }
    if cfg.youtube.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("youtube.client_id must be non-empty"));
    }
    if cfg.youtube.client_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("youtube.client_secret must be non-empty"));
    }
    if cfg.youtube.page_size == 0 || cfg.youtube.page_size > 50 {
        return Err(ConfigError::Invalid("youtube.page_size must be in 1..=50"));
    }

    if cfg.fcm.server_key.trim().is_empty() {
        return Err(ConfigError::Invalid("fcm.server_key must be non-empty"));
    }
    if cfg.fcm.max_retries == 0 {
        return Err(ConfigError::Invalid("fcm.max_retries must be > 0"));
    }

    Ok(())
}

/// Example YAML configuration; parsed by tests and shipped as a template.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_secs: 300

youtube:
  api_key: "YOUR_YOUTUBE_API_KEY"
  client_id: "YOUR_GOOGLE_CLIENT_ID"
  client_secret: "YOUR_GOOGLE_CLIENT_SECRET"
  page_size: 50

fcm:
  server_key: "YOUR_FCM_SERVER_KEY"
  max_retries: 3
  retry_delay_ms: 1000
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_poll_interval() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.poll_interval_secs = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("poll_interval_secs")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_youtube_credentials() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.youtube.api_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api_key")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.youtube.client_secret = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_page_size() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.youtube.page_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.youtube.page_size = 51;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_fcm_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.fcm.server_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("server_key")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.fcm.max_retries = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.poll_interval_secs, 300);
        assert_eq!(cfg.youtube.page_size, 50);
    }
}
