// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Store Configuration Types
//
// Defines the configuration schema for a Keystone state store:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Live-reconfigurable sync settings (SyncConfig / SyncConfigPatch)
// - Maintenance cadence (backup, optimization, degraded threshold)
// - Event bus sizing and the component names the composition root registers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::state::Subsystem;

pub const API_VERSION: &str = "keystone.dev/v1";
pub const KIND: &str = "StoreConfig";

/// Settings that can be changed while the store is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Publish `state_updated` on the bus for every commit
    #[serde(default = "default_true")]
    pub enable_real_time_updates: bool,

    #[serde(default = "default_consistency_interval", with = "humantime_serde")]
    pub consistency_check_interval: Duration,

    /// Recover automatically when a component reports a fatal error
    #[serde(default = "default_true")]
    pub recovery_enabled: bool,

    #[serde(default = "default_true")]
    pub validation_enabled: bool,

    /// Run the optimizer on its timer
    #[serde(default = "default_true")]
    pub optimization_enabled: bool,

    /// Serialized size ceiling in bytes; exceeding it is a warning
    #[serde(default = "default_max_state_size")]
    pub max_state_size: usize,

    /// Per-component deadline for state export during recovery
    #[serde(default = "default_sync_timeout", with = "humantime_serde")]
    pub sync_timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_consistency_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_state_size() -> usize {
    10 * 1024 * 1024
}

fn default_sync_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enable_real_time_updates: true,
            consistency_check_interval: default_consistency_interval(),
            recovery_enabled: true,
            validation_enabled: true,
            optimization_enabled: true,
            max_state_size: default_max_state_size(),
            sync_timeout: default_sync_timeout(),
        }
    }
}

/// Partial [`SyncConfig`]; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_real_time_updates: Option<bool>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub consistency_check_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_state_size: Option<usize>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub sync_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Apply a patch and return the names of the fields whose value changed.
    pub fn apply(&mut self, patch: &SyncConfigPatch) -> Vec<&'static str> {
        let mut changed = Vec::new();

        macro_rules! set {
            ($field:ident, $name:literal) => {
                if let Some(value) = patch.$field {
                    if self.$field != value {
                        self.$field = value;
                        changed.push($name);
                    }
                }
            };
        }

        set!(enable_real_time_updates, "enableRealTimeUpdates");
        set!(consistency_check_interval, "consistencyCheckInterval");
        set!(recovery_enabled, "recoveryEnabled");
        set!(validation_enabled, "validationEnabled");
        set!(optimization_enabled, "optimizationEnabled");
        set!(max_state_size, "maxStateSize");
        set!(sync_timeout, "syncTimeout");

        changed
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.consistency_check_interval.is_zero() {
            anyhow::bail!("sync.consistencyCheckInterval must be greater than zero");
        }
        if self.sync_timeout.is_zero() {
            anyhow::bail!("sync.syncTimeout must be greater than zero");
        }
        if self.max_state_size == 0 {
            anyhow::bail!("sync.maxStateSize must be greater than zero");
        }
        Ok(())
    }
}

/// Cadence of the background maintenance passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceConfig {
    #[serde(default = "default_backup_interval", with = "humantime_serde")]
    pub backup_interval: Duration,

    #[serde(default = "default_optimization_interval", with = "humantime_serde")]
    pub optimization_interval: Duration,

    /// Consecutive failed consistency audits before `system.status`
    /// is degraded to `error`
    #[serde(default = "default_degraded_after")]
    pub degraded_after_failures: u32,
}

fn default_backup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_optimization_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_degraded_after() -> u32 {
    3
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            backup_interval: default_backup_interval(),
            optimization_interval: default_optimization_interval(),
            degraded_after_failures: default_degraded_after(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBusConfig {
    /// Events buffered per subscriber before the slowest one lags
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

fn default_bus_capacity() -> usize {
    1000
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under `spec:`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfigSpec {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// Subsystem components registered by the composition root
    #[serde(default)]
    pub components: Vec<String>,
}

/// Top-level configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfigManifest {
    /// Must be "keystone.dev/v1"
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Must be "StoreConfig"
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: StoreConfigSpec,
}

impl Default for StoreConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "keystone".to_string(),
                version: None,
                labels: None,
            },
            spec: StoreConfigSpec {
                components: Subsystem::COMPONENTS.iter().map(|s| s.key().to_string()).collect(),
                ..StoreConfigSpec::default()
            },
        }
    }
}

impl StoreConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. KEYSTONE_CONFIG_PATH environment variable
    /// 2. ./keystone-config.yaml (working directory)
    /// 3. ~/.keystone/config.yaml (user home)
    /// 4. /etc/keystone/config.yaml (system, Unix) or C:\ProgramData\Keystone\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("KEYSTONE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./keystone-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".keystone").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/keystone/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Keystone\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = bool_env("KEYSTONE_RECOVERY_ENABLED") {
            tracing::info!("Environment override: KEYSTONE_RECOVERY_ENABLED={}", value);
            self.spec.sync.recovery_enabled = value;
        }
        if let Some(value) = bool_env("KEYSTONE_OPTIMIZATION_ENABLED") {
            tracing::info!("Environment override: KEYSTONE_OPTIMIZATION_ENABLED={}", value);
            self.spec.sync.optimization_enabled = value;
        }
        if let Some(value) = bool_env("KEYSTONE_VALIDATION_ENABLED") {
            tracing::info!("Environment override: KEYSTONE_VALIDATION_ENABLED={}", value);
            self.spec.sync.validation_enabled = value;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.sync.validate()?;

        let maintenance = &self.spec.maintenance;
        if maintenance.backup_interval.is_zero() {
            anyhow::bail!("maintenance.backupInterval must be greater than zero");
        }
        if maintenance.optimization_interval.is_zero() {
            anyhow::bail!("maintenance.optimizationInterval must be greater than zero");
        }
        if maintenance.degraded_after_failures == 0 {
            anyhow::bail!("maintenance.degradedAfterFailures must be at least 1");
        }

        if self.spec.event_bus.capacity == 0 {
            anyhow::bail!("eventBus.capacity must be greater than zero");
        }

        for name in &self.spec.components {
            match Subsystem::from_key(name) {
                Some(subsystem) if Subsystem::COMPONENTS.contains(&subsystem) => {}
                _ => anyhow::bail!("Unknown component '{}' in spec.components", name),
            }
        }

        Ok(())
    }
}

fn bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                name,
                value
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
apiVersion: keystone.dev/v1
kind: StoreConfig
metadata:
  name: studio
spec:
  sync:
    consistencyCheckInterval: 10s
    recoveryEnabled: false
    syncTimeout: 2s
  maintenance:
    backupInterval: 2m
  components:
    - memory
    - aiSuggestions
"#;

    #[test]
    fn test_parse_manifest_with_defaults() {
        let config = StoreConfigManifest::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.metadata.name, "studio");
        assert_eq!(config.spec.sync.consistency_check_interval, Duration::from_secs(10));
        assert!(!config.spec.sync.recovery_enabled);
        assert!(config.spec.sync.validation_enabled);
        assert_eq!(config.spec.sync.sync_timeout, Duration::from_secs(2));
        assert_eq!(config.spec.maintenance.backup_interval, Duration::from_secs(120));
        assert_eq!(config.spec.maintenance.optimization_interval, Duration::from_secs(30));
        assert_eq!(config.spec.event_bus.capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_manifest_is_valid() {
        let config = StoreConfigManifest::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spec.components.len(), Subsystem::COMPONENTS.len());
    }

    #[test]
    fn test_validate_rejects_bad_api_version() {
        let mut config = StoreConfigManifest::default();
        config.api_version = "v0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_component() {
        let mut config = StoreConfigManifest::default();
        config.spec.components.push("billing".to_string());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("billing"));

        config.spec.components = vec!["user".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = StoreConfigManifest::default();
        config.spec.sync.consistency_check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loaded = StoreConfigManifest::load_or_default(Some(file.path().to_path_buf())).unwrap();
        let out = tempfile::NamedTempFile::new().unwrap();
        loaded.to_yaml_file(out.path()).unwrap();

        let reloaded = StoreConfigManifest::from_yaml_file(out.path()).unwrap();
        assert_eq!(reloaded.spec.sync, loaded.spec.sync);
        assert_eq!(reloaded.spec.components, vec!["memory", "aiSuggestions"]);
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let result = StoreConfigManifest::load_or_default(Some(PathBuf::from("/nonexistent/keystone.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_config_patch_reports_changes() {
        let mut config = SyncConfig::default();
        let patch = SyncConfigPatch {
            consistency_check_interval: Some(Duration::from_secs(1)),
            recovery_enabled: Some(true),
            max_state_size: Some(1024),
            ..SyncConfigPatch::default()
        };

        let changed = config.apply(&patch);
        assert_eq!(changed, vec!["consistencyCheckInterval", "maxStateSize"]);
        assert_eq!(config.consistency_check_interval, Duration::from_secs(1));
        assert_eq!(config.max_state_size, 1024);
    }

    #[test]
    fn test_sync_config_patch_from_json() {
        let patch: SyncConfigPatch =
            serde_json::from_str(r#"{"consistencyCheckInterval":"250ms","validationEnabled":false}"#).unwrap();
        assert_eq!(patch.consistency_check_interval, Some(Duration::from_millis(250)));
        assert_eq!(patch.validation_enabled, Some(false));
        assert!(patch.sync_timeout.is_none());
    }
}
