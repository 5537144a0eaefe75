//! Configuration management
//!
//! Handles:
//! - Office allow-list and presence cycle settings
//! - Remote store selection (MQTT or HTTP) and write mode
//! - Cross-platform storage as TOML

use anyhow::{bail, Context, Result};
use officetrack_core::{
    AllowList, ReportPolicy, ServiceConfig, TriggerSources, WriteMode, UNKNOWN_HARDWARE_ID,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "OFFICETRACK_CONFIG";

pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub presence: PresenceConfig,
    pub store: StoreConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub office_networks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_network: Option<String>,
    /// Speculative proximity rule: any of these visible counts as inside
    pub nearby_networks: Vec<String>,
    pub poll_interval_secs: u64,
    pub report_policy: ReportPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub device_id_fallback: String,
    pub display_name: String,
    pub query_timeout_secs: u64,
    pub triggers: TriggerSources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mqtt,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub write_mode: WriteMode,
    pub collection: String,
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub keep_alive_secs: u16,
    pub topic_prefix: String,
    pub accept_commands: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub base_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            presence: PresenceConfig::default(),
            store: StoreConfig::default(),
            mqtt: Some(MqttConfig::default()),
            http: None,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            office_networks: Vec::new(),
            preferred_network: None,
            nearby_networks: Vec::new(),
            poll_interval_secs: 60,
            report_policy: ReportPolicy::Always,
            interface: None,
            device_id_fallback: UNKNOWN_HARDWARE_ID.to_string(),
            display_name: String::new(),
            query_timeout_secs: 3,
            triggers: TriggerSources::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mqtt,
            write_mode: WriteMode::Upsert,
            collection: "userStatus".to_string(),
            write_timeout_secs: 10,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: None,
            keep_alive_secs: 60,
            topic_prefix: "officetrack".to_string(),
            accept_commands: true,
        }
    }
}

impl AgentConfig {
    /// Load config from `path`; a missing file yields defaults
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AgentConfig =
            toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Save config to `path`, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("officetrack-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// `--config` flag, then `OFFICETRACK_CONFIG`, then the OS location
    pub fn resolve_path(cli: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = cli {
            return Ok(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Self::config_file_path(),
        }
    }

    /// Check if this is first-time setup
    pub fn is_first_time_setup(path: &Path) -> bool {
        !path.exists()
    }

    /// Rejects configurations the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        let presence = &self.presence;

        let has_office = presence.office_networks.iter().any(|n| !n.is_empty())
            || presence.preferred_network.as_deref().is_some_and(|n| !n.is_empty());
        if !has_office {
            bail!("No office networks configured; run `officetrack-agent setup` or set presence.office_networks");
        }

        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&presence.poll_interval_secs) {
            bail!(
                "presence.poll_interval_secs must be between {} and {}, got {}",
                MIN_POLL_INTERVAL_SECS,
                MAX_POLL_INTERVAL_SECS,
                presence.poll_interval_secs
            );
        }

        if presence.query_timeout_secs == 0 {
            bail!("presence.query_timeout_secs must be at least 1");
        }

        if self.store.write_timeout_secs == 0 {
            bail!("store.write_timeout_secs must be at least 1");
        }

        if self.store.collection.trim().is_empty() {
            bail!("store.collection must not be empty");
        }

        match self.store.backend {
            StoreBackend::Mqtt if self.mqtt.is_none() => {
                bail!("store.backend is \"mqtt\" but the [mqtt] section is missing")
            }
            StoreBackend::Http => match &self.http {
                None => bail!("store.backend is \"http\" but the [http] section is missing"),
                Some(http) if http.base_url.trim().is_empty() => bail!("http.base_url must not be empty"),
                Some(_) => {}
            },
            _ => {}
        }

        Ok(())
    }

    pub fn allow_list(&self) -> AllowList {
        let presence = &self.presence;
        let mut allow_list = AllowList::new(presence.office_networks.iter().filter(|n| !n.is_empty()));
        if let Some(preferred) = presence.preferred_network.as_deref().filter(|n| !n.is_empty()) {
            allow_list = allow_list.with_preferred(preferred);
        }
        allow_list.with_proximity(presence.nearby_networks.iter().filter(|n| !n.is_empty()))
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            poll_interval: Duration::from_secs(self.presence.poll_interval_secs),
            triggers: self.presence.triggers,
            report_policy: self.presence.report_policy,
            write_timeout: Duration::from_secs(self.store.write_timeout_secs),
            device_id_fallback: self.presence.device_id_fallback.clone(),
        }
    }

    pub fn query_limit(&self) -> Duration {
        Duration::from_secs(self.presence.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn office_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.presence.office_networks = vec!["officeNet".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.presence.poll_interval_secs, 60);
        assert_eq!(config.presence.report_policy, ReportPolicy::Always);
        assert_eq!(config.store.backend, StoreBackend::Mqtt);
        assert_eq!(config.store.write_mode, WriteMode::Upsert);
        assert_eq!(config.store.collection, "userStatus");
        assert_eq!(config.presence.device_id_fallback, "unknown");
    }

    #[test]
    fn test_config_file_path() {
        let path = AgentConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("officetrack-agent"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_cli_path_wins() {
        let path = AgentConfig::resolve_path(Some(PathBuf::from("/tmp/custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        assert!(AgentConfig::is_first_time_setup(&path));

        let mut config = office_config();
        config.presence.preferred_network = Some("officeNet-5G".to_string());
        config.presence.report_policy = ReportPolicy::OnChange;
        config.presence.triggers.timer = false;
        config.store.write_mode = WriteMode::Append;
        config.save(&path).await.unwrap();

        let loaded = AgentConfig::load(&path).await.unwrap();
        assert!(!AgentConfig::is_first_time_setup(&path));
        assert_eq!(loaded.presence.office_networks, vec!["officeNet"]);
        assert_eq!(loaded.presence.preferred_network.as_deref(), Some("officeNet-5G"));
        assert_eq!(loaded.presence.report_policy, ReportPolicy::OnChange);
        assert!(!loaded.presence.triggers.timer);
        assert!(loaded.presence.triggers.startup);
        assert_eq!(loaded.store.write_mode, WriteMode::Append);
        assert!(loaded.http.is_none());
        loaded.validate().unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AgentConfig::load(&temp_dir.path().join("absent.toml")).await.unwrap();
        assert!(config.presence.office_networks.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [presence]
            office_networks = ["officeNet"]
            report_policy = "on_change"

            [presence.triggers]
            timer = false

            [store]
            backend = "http"
            write_mode = "append"

            [http]
            base_url = "https://status.example.com/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.presence.poll_interval_secs, 60);
        assert_eq!(config.presence.report_policy, ReportPolicy::OnChange);
        assert!(config.presence.triggers.network_events);
        assert!(!config.presence.triggers.timer);
        assert_eq!(config.store.backend, StoreBackend::Http);
        assert_eq!(config.store.collection, "userStatus");
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_configs() {
        assert!(office_config().validate().is_ok());

        let mut empty = office_config();
        empty.presence.office_networks = vec![String::new()];
        assert!(empty.validate().is_err());

        let mut preferred_only = empty.clone();
        preferred_only.presence.preferred_network = Some("officeNet".to_string());
        assert!(preferred_only.validate().is_ok());

        for interval in [4, 3601] {
            let mut config = office_config();
            config.presence.poll_interval_secs = interval;
            assert!(config.validate().is_err());
        }
        for interval in [5, 3600] {
            let mut config = office_config();
            config.presence.poll_interval_secs = interval;
            assert!(config.validate().is_ok());
        }

        let mut no_mqtt = office_config();
        no_mqtt.mqtt = None;
        assert!(no_mqtt.validate().is_err());

        let mut no_http = office_config();
        no_http.store.backend = StoreBackend::Http;
        assert!(no_http.validate().is_err());

        let mut unbounded_writes = office_config();
        unbounded_writes.store.write_timeout_secs = 0;
        assert!(unbounded_writes.validate().is_err());
    }

    #[test]
    fn test_allow_list_and_service_config() {
        let mut config = office_config();
        config.presence.preferred_network = Some("officeNet-5G".to_string());
        config.presence.nearby_networks = vec!["lobbyNet".to_string()];
        config.presence.poll_interval_secs = 30;
        config.store.write_timeout_secs = 4;
        config.presence.device_id_fallback = "desk-42".to_string();

        let allow_list = config.allow_list();
        assert!(allow_list.contains_exact("officeNet"));
        assert!(allow_list.contains_exact("officeNet-5G"));
        assert!(allow_list.contains_proximity("lobbyNet"));

        let service = config.service_config();
        assert_eq!(service.poll_interval, Duration::from_secs(30));
        assert_eq!(service.write_timeout, Duration::from_secs(4));
        assert_eq!(service.device_id_fallback, "desk-42");
    }
}
