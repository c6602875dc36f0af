use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Settings;

/// Configuration manager for console settings.
/// Settings are stored in settings.json in the working directory by
/// default. Invalid incoming settings are rejected before they replace
/// the ones in effect.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager.
    /// If no path is provided, defaults to 'settings.json' in the
    /// current working directory.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from("settings.json"));

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Load settings from the configuration file. Writes and returns
    /// the defaults if the file doesn't exist yet.
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Settings file version {} doesn't match application version {}",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        Self::validate_settings(&config_file.settings).map_err(ConfigError::ValidationError)?;
        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to the configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            modified_at: chrono::Utc::now().to_rfc3339(),
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Validate, adopt and persist new settings. On validation failure
    /// the prior settings remain in effect.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Validate settings before they are applied.
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if settings.listen_port == 0 {
            errors.push("listen_port must be non-zero".to_string());
        }
        if settings.remote_port == 0 {
            errors.push("remote_port must be non-zero".to_string());
        }
        if settings.remote_host.trim().is_empty() {
            errors.push("remote_host must not be empty".to_string());
        }
        if settings.midi_enabled && settings.midi_device.trim().is_empty() {
            errors.push("midi_device must not be empty when MIDI is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    ReadError(String),
    WriteError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(msg) => write!(f, "Failed to read settings file: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Failed to write settings file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse settings file: {}", msg),
            ConfigError::SerializeError(msg) => write!(f, "Failed to serialize settings: {}", msg),
            ConfigError::ValidationError(errors) => {
                write!(f, "Settings validation errors: {}", errors.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}
