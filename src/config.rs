use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub state_store: StateStoreConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentConfig {
    #[serde(default = "default_log")]
    pub log: String,
    #[serde(default = "default_sync_period", with = "duration_secs")]
    pub sync_period: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log: default_log(),
            sync_period: default_sync_period(),
        }
    }
}

fn default_log() -> String {
    "nodeagent=info".to_owned()
}

fn default_sync_period() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RuntimeConfig {
    #[serde(default = "default_podman_path")]
    pub podman_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            podman_path: default_podman_path(),
        }
    }
}

fn default_podman_path() -> PathBuf {
    "podman".into()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SourcesConfig {
    #[serde(default)]
    pub file: Option<FileSourceConfig>,
    #[serde(default)]
    pub http: Option<HttpSourceConfig>,
    #[serde(default)]
    pub etcd: Option<EtcdSourceConfig>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileSourceConfig {
    pub path: PathBuf,
    #[serde(default = "default_poll_period", with = "duration_secs")]
    pub poll_period: Duration,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HttpSourceConfig {
    pub url: String,
    #[serde(default = "default_poll_period", with = "duration_secs")]
    pub poll_period: Duration,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EtcdSourceConfig {
    pub machine_id: String,
}

fn default_poll_period() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StateStoreConfig {
    #[serde(default = "default_etcd_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_registry_prefix")]
    pub registry_prefix: String,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_etcd_endpoint(),
            registry_prefix: default_registry_prefix(),
        }
    }
}

fn default_etcd_endpoint() -> String {
    "http://127.0.0.1:4001".to_owned()
}

fn default_registry_prefix() -> String {
    "/registry/hosts".to_owned()
}

impl StateStoreConfig {
    /// The key prefix an [`crate::sources::etcd_source::EtcdSource`] reads
    /// and watches for a given machine id.
    pub fn host_prefix(&self, machine_id: &str) -> String {
        format!("{}/{machine_id}", self.registry_prefix.trim_end_matches('/'))
    }
}

/// Serializes a [`Duration`] as plain whole seconds, so config files read
/// `sync_period = 10` rather than a nested struct.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
