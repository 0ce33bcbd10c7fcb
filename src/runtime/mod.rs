//! The container runtime driver: a thin adapter over the runtime's
//! list/inspect/create/start/stop primitives, plus the higher-level queries
//! the sync engine actually calls.
//!
//! [`ContainerRuntime`] is the low-level seam — one production
//! implementation ([`podman::PodmanRuntime`]) shells out to the `podman`
//! binary, one in-memory implementation ([`FakeRuntime`]) backs the sync
//! engine's unit tests. [`RuntimeDriver`] wraps either behind the
//! higher-level `exists`/`findByName`/`listManaged`/`kill` operations
//! spec.md §4.3 describes; it is stateless aside from the wrapped client, so
//! it is safe to share behind an `Arc` and call concurrently.

pub mod podman;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::name_codec;
use crate::translator::LaunchSpec;

/// The timeout `killContainer` passes to a runtime stop call.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// A container as reported by `list`, stripped to what the driver needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
}

impl ContainerSummary {
    fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Parameters for launching one container, combining the translated launch
/// spec with the identity and image the runtime needs to actually create it.
#[derive(Clone, Debug)]
pub struct CreateRequest<'a> {
    pub runtime_name: &'a str,
    pub image: &'a str,
    pub spec: &'a LaunchSpec,
}

/// The runtime primitives the core consumes. One call per RPC — no
/// implementation is expected to retry or cache.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists containers. `all` includes stopped ones.
    async fn list(&self, all: bool) -> anyhow::Result<Vec<ContainerSummary>>;

    /// Full inspect detail for a single container id.
    async fn inspect(&self, id: &str) -> anyhow::Result<serde_json::Value>;

    /// Creates (but does not start) a container, returning its id.
    async fn create(&self, request: CreateRequest<'_>) -> anyhow::Result<String>;

    /// Starts a previously created container.
    async fn start(&self, id: &str) -> anyhow::Result<()>;

    /// Stops a running container, waiting up to `timeout` before a harder
    /// kill.
    async fn stop(&self, id: &str, timeout: Duration) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: ContainerRuntime + ?Sized> ContainerRuntime for std::sync::Arc<T> {
    async fn list(&self, all: bool) -> anyhow::Result<Vec<ContainerSummary>> {
        (**self).list(all).await
    }

    async fn inspect(&self, id: &str) -> anyhow::Result<serde_json::Value> {
        (**self).inspect(id).await
    }

    async fn create(&self, request: CreateRequest<'_>) -> anyhow::Result<String> {
        (**self).create(request).await
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        (**self).start(id).await
    }

    async fn stop(&self, id: &str, timeout: Duration) -> anyhow::Result<()> {
        (**self).stop(id, timeout).await
    }
}

/// Result of [`RuntimeDriver::container_exists`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ContainerExistence {
    pub exists: bool,
    pub detail: Option<serde_json::Value>,
}

/// Higher-level queries layered on top of [`ContainerRuntime`].
pub struct RuntimeDriver<R> {
    runtime: R,
}

impl<R> RuntimeDriver<R>
where
    R: ContainerRuntime,
{
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    /// Does a container for `(manifest_id, container_name)` exist?
    ///
    /// Matches the reference behavior of two `list` calls plus one
    /// `inspect` when a match is found (spec.md §4.3): one `list` to
    /// determine existence, a second to re-resolve the id for `inspect`.
    pub async fn container_exists(
        &self,
        manifest_id: &str,
        container_name: &str,
    ) -> anyhow::Result<ContainerExistence> {
        let runtime_name = name_codec::encode(manifest_id, container_name);

        let first = self.runtime.list(true).await?;
        if !first.iter().any(|c| c.has_name(&runtime_name)) {
            return Ok(ContainerExistence {
                exists: false,
                detail: None,
            });
        }

        let second = self.runtime.list(true).await?;
        let matched = second
            .into_iter()
            .find(|c| c.has_name(&runtime_name))
            .ok_or_else(|| anyhow::anyhow!("container disappeared between list calls"))?;

        let detail = self.runtime.inspect(&matched.id).await?;
        Ok(ContainerExistence {
            exists: true,
            detail: Some(detail),
        })
    }

    /// Creates and starts a container for a manifest entry.
    pub async fn create_and_start(
        &self,
        manifest_id: &str,
        container_name: &str,
        image: &str,
        spec: &LaunchSpec,
    ) -> anyhow::Result<String> {
        let runtime_name = name_codec::encode(manifest_id, container_name);
        let id = self
            .runtime
            .create(CreateRequest {
                runtime_name: &runtime_name,
                image,
                spec,
            })
            .await?;
        self.runtime.start(&id).await?;
        Ok(id)
    }

    /// Linear scan of listed containers for one whose name exactly matches.
    pub async fn get_container_id(&self, name: &str) -> anyhow::Result<Option<String>> {
        let containers = self.runtime.list(true).await?;
        Ok(containers
            .into_iter()
            .find(|c| c.has_name(name))
            .map(|c| c.id))
    }

    /// Scans and inspects the container with the given runtime name.
    pub async fn get_container_by_name(
        &self,
        name: &str,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        match self.get_container_id(name).await? {
            Some(id) => Ok(Some(self.runtime.inspect(&id).await?)),
            None => Ok(None),
        }
    }

    /// All runtime container names, unfiltered. Filtering managed from
    /// unmanaged names is the sync engine's responsibility.
    pub async fn list_managed(&self) -> anyhow::Result<Vec<String>> {
        let containers = self.runtime.list(true).await?;
        Ok(containers.into_iter().flat_map(|c| c.names).collect())
    }

    /// Resolves `name` to an id via `list` and stops it. If `list` fails,
    /// the error is surfaced and `stop` is never called.
    pub async fn kill_container(&self, name: &str) -> anyhow::Result<()> {
        let id = self
            .get_container_id(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no container named {name}"))?;
        self.runtime.stop(&id, KILL_TIMEOUT).await
    }
}
