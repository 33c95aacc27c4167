//! Configuration management for Terra Monitor
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.
//! Every field has a default, so an empty file is a valid config.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

pub use watcher::ConfigWatcher;

use crate::session::{ActivityPolicy, SessionSettings};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// MIDI capture configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Client name announced to the host MIDI system
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub connect: ConnectPolicy,
    /// Case-insensitive substring used by the `pattern` policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_pattern: Option<String>,
    /// How often the port list is polled for hotplug changes
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_ms: u64,
    /// Capacity of the capture channel between MIDI callbacks and the session
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            connect: ConnectPolicy::default(),
            port_pattern: None,
            rescan_interval_ms: default_rescan_interval(),
            frame_buffer: default_frame_buffer(),
        }
    }
}

/// Which input ports get a capture connection
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectPolicy {
    /// Only devices classified as Terra hardware
    #[default]
    Targets,
    /// Every input port
    All,
    /// Ports whose name contains `port_pattern`
    Pattern,
}

/// Embedded web UI and HTTP API
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

/// Detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_target_threshold")]
    pub target_threshold: f64,
    #[serde(default = "default_activity_step")]
    pub activity_step: f64,
    #[serde(default = "default_activity_cap")]
    pub activity_cap: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            target_threshold: default_target_threshold(),
            activity_step: default_activity_step(),
            activity_cap: default_activity_cap(),
        }
    }
}

/// Message log output
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Print every message to the console
    #[serde(default = "default_true")]
    pub console: bool,
    /// Default number of entries served by `/api/log`
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            console: true,
            recent_limit: default_recent_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        // serde_yaml reads an empty document as null
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path))?
        };

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise write and return the defaults
    pub async fn load_or_init(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            return Self::load(path).await;
        }

        let config = AppConfig::default();
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        config.save(path).await?;
        tracing::info!("No config found, wrote defaults to {}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("MIDI client_name cannot be empty");
        }
        if self.midi.rescan_interval_ms == 0 {
            anyhow::bail!("MIDI rescan_interval_ms must be greater than 0");
        }
        if self.midi.frame_buffer == 0 {
            anyhow::bail!("MIDI frame_buffer must be greater than 0");
        }
        if self.midi.connect == ConnectPolicy::Pattern
            && self.midi.port_pattern.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            anyhow::bail!("MIDI connect policy 'pattern' requires a non-empty port_pattern");
        }

        if self.web.port == 0 {
            anyhow::bail!("Web port cannot be 0");
        }

        let classifier = &self.classifier;
        if !(0.0..=1.0).contains(&classifier.target_threshold) {
            anyhow::bail!(
                "Classifier target_threshold {} must be between 0 and 1",
                classifier.target_threshold
            );
        }
        if !(0.0..=1.0).contains(&classifier.activity_cap) {
            anyhow::bail!(
                "Classifier activity_cap {} must be between 0 and 1",
                classifier.activity_cap
            );
        }
        if classifier.activity_step < 0.0 {
            anyhow::bail!("Classifier activity_step cannot be negative");
        }

        if self.log.broadcast_capacity == 0 {
            anyhow::bail!("Log broadcast_capacity must be greater than 0");
        }

        Ok(())
    }

    /// Session tunables derived from this config
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            target_threshold: self.classifier.target_threshold,
            activity: ActivityPolicy {
                step: self.classifier.activity_step,
                cap: self.classifier.activity_cap,
            },
            broadcast_capacity: self.log.broadcast_capacity,
        }
    }
}

fn default_client_name() -> String { "Terra Monitor".to_string() }
fn default_rescan_interval() -> u64 { 2000 }
fn default_frame_buffer() -> usize { 1000 }
fn default_true() -> bool { true }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 3000 }
fn default_target_threshold() -> f64 { crate::device::classifier::DEFAULT_TARGET_THRESHOLD }
fn default_activity_step() -> f64 { 0.1 }
fn default_activity_cap() -> f64 { 0.8 }
fn default_broadcast_capacity() -> usize { 1024 }
fn default_recent_limit() -> usize { 500 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
midi:
  connect: all
web:
  port: 8080
"#,
        )
        .unwrap();

        assert_eq!(config.midi.connect, ConnectPolicy::All);
        assert_eq!(config.midi.client_name, "Terra Monitor");
        assert_eq!(config.web.port, 8080);
        assert!(config.web.enabled);
        assert_eq!(config.classifier, ClassifierConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.classifier.target_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.classifier.activity_cap = -0.1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.web.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.midi.rescan_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.log.broadcast_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.midi.connect = ConnectPolicy::Pattern;
        assert!(config.validate().is_err());
        config.midi.port_pattern = Some("arduino".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_settings() {
        let mut config = AppConfig::default();
        config.classifier.target_threshold = 0.3;
        config.classifier.activity_cap = 0.6;

        let settings = config.session_settings();
        assert_eq!(settings.target_threshold, 0.3);
        assert_eq!(settings.activity.cap, 0.6);
        assert_eq!(settings.broadcast_capacity, 1024);
    }

    #[tokio::test]
    async fn test_load_or_init_writes_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let config = AppConfig::load_or_init(&path).await?;
        assert_eq!(config, AppConfig::default());
        assert!(Path::new(&path).exists());

        let reloaded = AppConfig::load(&path).await?;
        assert_eq!(reloaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_empty_and_invalid() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");

        std::fs::write(&path, "")?;
        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config, AppConfig::default());

        std::fs::write(&path, "classifier:\n  target_threshold: 2.0\n")?;
        assert!(AppConfig::load(&path.to_string_lossy()).await.is_err());
        Ok(())
    }
}
