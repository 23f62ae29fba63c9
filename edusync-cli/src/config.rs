use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Whether sync passes are mirrored to the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Online,
    Offline,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Online => write!(f, "online"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(SyncMode::Online),
            "offline" => Ok(SyncMode::Offline),
            other => Err(format!(
                "Invalid sync mode: '{}'. Valid options: online, offline",
                other
            )),
        }
    }
}

/// Cloud backup storage
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriveConfig {
    /// OAuth bearer token for the Drive API
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// API base URL (default: https://www.googleapis.com)
    pub api_base: Option<String>,
}

impl DriveConfig {
    pub fn is_configured(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Auto-backup scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Minutes between auto-backup checks (default: 60)
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,
}

fn default_check_interval() -> u64 {
    60
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_check_interval(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Postgres connection string of the remote database
    #[serde(skip_serializing)]
    pub database_url: ConfigValue<Option<String>>,
    /// SQL-over-HTTP endpoint override
    pub sql_endpoint: ConfigValue<Option<String>>,
    /// Directory for the local mirror and settings
    pub data_dir: ConfigValue<PathBuf>,
    pub sync_mode: ConfigValue<SyncMode>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub drive: DriveConfig,
    pub backup: BackupConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_url: Option<String>,
    sql_endpoint: Option<String>,
    data_dir: Option<PathBuf>,
    sync_mode: Option<SyncMode>,
    drive: Option<DriveConfig>,
    backup: Option<BackupConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_url = ConfigValue::new(None, ConfigSource::Default);
        let mut sql_endpoint = ConfigValue::new(None, ConfigSource::Default);
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut sync_mode = ConfigValue::new(SyncMode::default(), ConfigSource::Default);
        let mut config_file = None;
        let mut drive = DriveConfig::default();
        let mut backup = BackupConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.database_url {
                database_url = ConfigValue::new(Some(url), ConfigSource::File);
            }
            if let Some(endpoint) = file_config.sql_endpoint {
                sql_endpoint = ConfigValue::new(Some(endpoint), ConfigSource::File);
            }
            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(mode) = file_config.sync_mode {
                sync_mode = ConfigValue::new(mode, ConfigSource::File);
            }
            if let Some(drive_config) = file_config.drive {
                drive = drive_config;
            }
            if let Some(backup_config) = file_config.backup {
                backup = backup_config;
            }
        }

        if let Ok(url) = std::env::var("EDUSYNC_DATABASE_URL") {
            database_url = ConfigValue::new(Some(url), ConfigSource::Environment);
        }
        if let Ok(endpoint) = std::env::var("EDUSYNC_SQL_ENDPOINT") {
            sql_endpoint = ConfigValue::new(Some(endpoint), ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("EDUSYNC_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(mode) = std::env::var("EDUSYNC_SYNC_MODE") {
            let mode = mode.parse().map_err(ConfigError::InvalidValue)?;
            sync_mode = ConfigValue::new(mode, ConfigSource::Environment);
        }
        if let Ok(token) = std::env::var("EDUSYNC_DRIVE_TOKEN") {
            drive.access_token = Some(token);
        }

        Ok(Self {
            database_url,
            sql_endpoint,
            data_dir,
            sync_mode,
            config_file,
            drive,
            backup,
        })
    }

    /// Path of the local mirror database
    pub fn mirror_path(&self) -> PathBuf {
        self.data_dir.value.join("edusync.db")
    }

    pub fn is_offline(&self) -> bool {
        self.sync_mode.value == SyncMode::Offline
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/edusync/
    /// - macOS: ~/Library/Application Support/edusync/
    /// - Windows: %APPDATA%/edusync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("edusync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/edusync/
    /// - macOS: ~/Library/Application Support/edusync/
    /// - Windows: %APPDATA%/edusync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("edusync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.to_string_lossy().contains("edusync"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.sync_mode.value, SyncMode::Online);
        assert_eq!(config.backup.check_interval_minutes, 60);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_url: postgres://u:p@ep-x.neon.tech/school").unwrap();
        writeln!(file, "data_dir: cache").unwrap();
        writeln!(file, "sync_mode: offline").unwrap();
        writeln!(file, "drive:").unwrap();
        writeln!(file, "  access_token: tok").unwrap();
        writeln!(file, "backup:").unwrap();
        writeln!(file, "  check_interval_minutes: 15").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(
            config.database_url.value.as_deref(),
            Some("postgres://u:p@ep-x.neon.tech/school")
        );
        assert_eq!(config.database_url.source, ConfigSource::File);
        assert_eq!(config.data_dir.value, temp_dir.path().join("cache"));
        assert!(config.is_offline());
        assert!(config.drive.is_configured());
        assert_eq!(config.backup.check_interval_minutes, 15);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "sync_mode: online").unwrap();

        std::env::set_var("EDUSYNC_SYNC_MODE", "offline");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.sync_mode.value, SyncMode::Offline);
        assert_eq!(config.sync_mode.source, ConfigSource::Environment);

        std::env::remove_var("EDUSYNC_SYNC_MODE");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_unknown_sync_mode_in_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "sync_mode: sometimes").unwrap();

        assert!(Config::load(Some(config_path)).is_err());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_url: postgres://u:secret@h/db").unwrap();
        writeln!(file, "drive:").unwrap();
        writeln!(file, "  access_token: secret-token").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
