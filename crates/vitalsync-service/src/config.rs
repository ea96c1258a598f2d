//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vitalsync_types::Credentials;

/// Engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Flush worker settings.
    pub sync: SyncConfig,
    /// Remote API settings.
    pub remote: RemoteConfig,
    /// Static delivery identity.
    pub profile: ProfileConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use vitalsync_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.storage.validate());
        errors.extend(self.sync.validate());
        errors.extend(self.remote.validate());
        errors.extend(self.profile.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Records kept per vital type.
    pub retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: vitalsync_store::default_db_path(),
            retention: vitalsync_store::DEFAULT_RETENTION,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        if self.retention == 0 {
            errors.push(ValidationError {
                field: "storage.retention".to_string(),
                message: "retention must keep at least 1 record per vital type".to_string(),
            });
        }

        errors
    }
}

/// Minimum flush interval in seconds.
pub const MIN_FLUSH_INTERVAL: u64 = 5;
/// Maximum flush interval in seconds (1 hour).
pub const MAX_FLUSH_INTERVAL: u64 = 3600;

/// Flush worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic flush cycles.
    pub flush_interval: u64,
    /// Attempt a flush right after each recorded reading.
    pub optimistic_push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval: 60,
            optimistic_push: true,
        }
    }
}

impl SyncConfig {
    /// The flush interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval)
    }

    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.flush_interval < MIN_FLUSH_INTERVAL {
            errors.push(ValidationError {
                field: "sync.flush_interval".to_string(),
                message: format!(
                    "flush interval {} is too short (minimum {} seconds)",
                    self.flush_interval, MIN_FLUSH_INTERVAL
                ),
            });
        } else if self.flush_interval > MAX_FLUSH_INTERVAL {
            errors.push(ValidationError {
                field: "sync.flush_interval".to_string(),
                message: format!(
                    "flush interval {} is too long (maximum {} seconds / 1 hour)",
                    self.flush_interval, MAX_FLUSH_INTERVAL
                ),
            });
        }

        errors
    }
}

/// Minimum request timeout in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Maximum request timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the telemetry API.
    pub base_url: String,
    /// Bearer token for the telemetry API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_token: None,
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// The request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate remote configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.base_url.is_empty() {
            errors.push(ValidationError {
                field: "remote.base_url".to_string(),
                message: "base URL cannot be empty".to_string(),
            });
        } else if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".to_string(),
                message: format!(
                    "invalid base URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            });
        }

        if let Some(token) = &self.api_token
            && token.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "remote.api_token".to_string(),
                message: "API token cannot be empty string (omit it instead)".to_string(),
            });
        }

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            errors.push(ValidationError {
                field: "remote.timeout_secs".to_string(),
                message: format!(
                    "timeout {} is out of range ({}-{} seconds)",
                    self.timeout_secs, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS
                ),
            });
        }

        errors
    }
}

/// Static delivery identity.
///
/// When `device_id` is set, the remote profile endpoint is not consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Device identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Tenant identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl ProfileConfig {
    /// Static credentials, if a device identity is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        let device_id = self.device_id.as_deref()?;
        Some(Credentials::new(device_id, self.tenant_id.clone()))
    }

    /// Validate profile configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(device_id) = &self.device_id
            && device_id.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "profile.device_id".to_string(),
                message: "device id cannot be empty string (omit it instead)".to_string(),
            });
        }

        if self.tenant_id.is_some() && self.device_id.is_none() {
            errors.push(ValidationError {
                field: "profile.tenant_id".to_string(),
                message: "tenant id requires a device id".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `sync.flush_interval`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vitalsync")
        .join("engine.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.sync.flush_interval, 60);
        assert!(config.sync.optimistic_push);
        assert_eq!(config.storage.retention, 1000);
        assert_eq!(config.remote.timeout_secs, 10);
        assert!(config.profile.credentials().is_none());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("engine.toml");

        let config = Config {
            storage: StorageConfig {
                path: PathBuf::from("/tmp/records.db"),
                retention: 250,
            },
            sync: SyncConfig {
                flush_interval: 30,
                optimistic_push: false,
            },
            remote: RemoteConfig {
                base_url: "https://telemetry.example.com".to_string(),
                api_token: Some("secret".to_string()),
                timeout_secs: 5,
            },
            profile: ProfileConfig {
                device_id: Some("wearable-01".to_string()),
                tenant_id: Some("ward-7".to_string()),
            },
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/records.db"));
        assert_eq!(loaded.storage.retention, 250);
        assert_eq!(loaded.sync.flush_interval, 30);
        assert!(!loaded.sync.optimistic_push);
        assert_eq!(loaded.remote.api_token.as_deref(), Some("secret"));
        assert_eq!(loaded.remote.timeout(), Duration::from_secs(5));

        let creds = loaded.profile.credentials().unwrap();
        assert_eq!(creds.device_id.as_deref(), Some("wearable-01"));
        assert_eq!(creds.tenant_id.as_deref(), Some("ward-7"));
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sync]
            flush_interval = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.flush_interval, 120);
        assert!(config.sync.optimistic_push);
        assert_eq!(config.storage.retention, 1000);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/engine.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("vitalsync/engine.toml"));
    }

    #[test]
    fn test_flush_interval_bounds() {
        let mut config = Config::default();
        config.sync.flush_interval = 1;
        assert_eq!(fields(config.validate().unwrap_err()), vec!["sync.flush_interval"]);

        config.sync.flush_interval = 7200;
        assert!(config.validate().is_err());

        config.sync.flush_interval = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retention_rejected() {
        let mut config = Config::default();
        config.storage.retention = 0;
        assert_eq!(fields(config.validate().unwrap_err()), vec!["storage.retention"]);
    }

    #[test]
    fn test_remote_validation() {
        let mut config = Config::default();
        config.remote.base_url = "telemetry.example.com".to_string();
        config.remote.api_token = Some("  ".to_string());
        config.remote.timeout_secs = 0;

        let fields = fields(config.validate().unwrap_err());
        assert!(fields.contains(&"remote.base_url".to_string()));
        assert!(fields.contains(&"remote.api_token".to_string()));
        assert!(fields.contains(&"remote.timeout_secs".to_string()));
    }

    #[test]
    fn test_profile_validation() {
        let mut config = Config::default();
        config.profile.tenant_id = Some("ward-7".to_string());
        assert_eq!(fields(config.validate().unwrap_err()), vec!["profile.tenant_id"]);

        config.profile.device_id = Some(String::new());
        let fields = fields(config.validate().unwrap_err());
        assert_eq!(fields, vec!["profile.device_id"]);
    }

    #[test]
    fn test_validation_error_display() {
        let mut config = Config::default();
        config.sync.flush_interval = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("Configuration validation failed"));
        assert!(message.contains("sync.flush_interval"));
    }
}
