//! `podman`-backed [`ContainerRuntime`]. Shells out to the `podman` binary
//! the same way the teacher's `Podman` handle drove `ps`/`inspect`/`rm`/`run`:
//! invoke the CLI, parse its `--format json` output, surface any non-zero
//! exit as an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{ContainerRuntime, ContainerSummary, CreateRequest};

#[derive(Debug)]
pub struct PodmanRuntime {
    podman_path: PathBuf,
}

impl PodmanRuntime {
    pub fn new<P: AsRef<Path>>(podman_path: P) -> Self {
        Self {
            podman_path: podman_path.as_ref().into(),
        }
    }

    async fn run(&self, args: &[&str]) -> anyhow::Result<Vec<u8>> {
        debug!(?args, "running podman");
        let output = Command::new(&self.podman_path)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.podman_path.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "podman {args:?} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct PsEntryJson {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default, deserialize_with = "nullable_array")]
    names: Vec<String>,
}

fn nullable_array<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Vec<String>> = Deserialize::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn list(&self, all: bool) -> anyhow::Result<Vec<ContainerSummary>> {
        let mut args = vec!["ps", "--format", "json"];
        if all {
            args.push("-a");
        }
        let stdout = self.run(&args).await?;
        let entries: Vec<PsEntryJson> =
            serde_json::from_slice(&stdout).context("failed to parse podman ps output")?;

        Ok(entries
            .into_iter()
            .map(|e| ContainerSummary {
                id: e.id,
                names: e.names,
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> anyhow::Result<serde_json::Value> {
        let stdout = self.run(&["inspect", id]).await?;
        let mut entries: Vec<serde_json::Value> =
            serde_json::from_slice(&stdout).context("failed to parse podman inspect output")?;
        entries
            .pop()
            .ok_or_else(|| anyhow::anyhow!("podman inspect returned no entries for {id}"))
    }

    async fn create(&self, request: CreateRequest<'_>) -> anyhow::Result<String> {
        let mut args: Vec<String> = vec![
            "create".into(),
            "--name".into(),
            request.runtime_name.into(),
        ];

        for bind in &request.spec.binds {
            args.push("-v".into());
            args.push(bind.clone());
        }

        for env in &request.spec.env {
            args.push("-e".into());
            args.push(env.clone());
        }

        for port in &request.spec.exposed_ports {
            for host_port in request
                .spec
                .port_bindings
                .get(port)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let container_port = port.split('/').next().unwrap_or(port);
                let proto = port.split('/').nth(1).unwrap_or("tcp");
                args.push("-p".into());
                args.push(format!("{host_port}:{container_port}/{proto}"));
            }
        }

        args.push(request.image.into());
        args.extend(request.spec.argv.iter().cloned());

        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(&args_ref).await?;
        let id = String::from_utf8(stdout)
            .context("podman create returned non-utf8 output")?
            .trim()
            .to_owned();

        if id.is_empty() {
            anyhow::bail!("podman create returned an empty id");
        }

        Ok(id)
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        self.run(&["start", id]).await?;
        Ok(())
    }

    async fn stop(&self, id: &str, timeout: Duration) -> anyhow::Result<()> {
        self.run(&["stop", "-t", &timeout.as_secs().to_string(), id])
            .await?;
        Ok(())
    }
}
