//! The desired-state data model: what source adapters parse and what the
//! sync engine and manifest translator consume.
//!
//! Fields the core does not interpret are preserved opaquely via a flattened
//! [`serde_yaml::Value`] bag so that a manifest round-trips byte-for-byte
//! through re-serialization where it matters (change detection compares raw
//! bytes off the wire, never a re-encoded form, see [`crate::sources`]).

use serde::{Deserialize, Serialize};

/// A desired group of containers sharing identity.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ContainerManifest {
    pub id: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(flatten)]
    pub extra: serde_yaml::Value,
}

/// One container within a manifest.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Fields the core does not interpret itself but still needs to launch
    /// the container (e.g. `image`); passed through opaquely per spec.
    #[serde(flatten)]
    pub extra: serde_yaml::Value,
}

impl Container {
    /// Looks up an opaque, pass-through string field such as `image`.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key)?.as_str()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    #[serde(default)]
    pub protocol: String,
}

/// An observable record of something the agent did to a container.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Event {
    pub event: String,
    pub container: EventContainer,
}

/// The minimal container identity carried alongside an [`Event`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EventContainer {
    pub name: String,
}

impl Event {
    pub fn new(event: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            container: EventContainer {
                name: container_name.into(),
            },
        }
    }
}
