//! Periodic GET of a manifest URL.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{ChangeDetector, SourceUpdate};
use crate::manifest::ContainerManifest;

/// Response bodies larger than this are rejected rather than parsed. The
/// reference implementation has no such ceiling; unbounded manifest bodies
/// are an easy way to OOM a node agent polling an untrusted or misbehaving
/// endpoint.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub struct HttpSource {
    client: reqwest::Client,
    url: String,
    period: Duration,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, period: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            period,
        }
    }

    pub async fn run(self, tx: mpsc::Sender<SourceUpdate>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let source_id = format!("http:{}", self.url);
        let mut detector = ChangeDetector::new();
        let mut ticker = tokio::time::interval(self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }

            if let Err(err) = self.poll_once(&source_id, &mut detector, &tx).await {
                error!(%err, url = %self.url, "http source poll failed");
            }
        }
    }

    async fn poll_once(
        &self,
        source_id: &str,
        detector: &mut ChangeDetector,
        tx: &mpsc::Sender<SourceUpdate>,
    ) -> anyhow::Result<()> {
        let response = self.client.get(&self.url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("non-200 status from {}: {}", self.url, response.status());
        }
        let bytes = response.bytes().await?;
        if bytes.len() > MAX_BODY_BYTES {
            anyhow::bail!(
                "response from {} exceeds the {MAX_BODY_BYTES}-byte ceiling ({} bytes)",
                self.url,
                bytes.len()
            );
        }
        let manifest: ContainerManifest = serde_yaml::from_slice(&bytes)?;

        if !detector.changed(&bytes) {
            return Ok(());
        }

        debug!(id = %manifest.id, "http source observed a changed manifest");
        let _ = tx
            .send(SourceUpdate {
                source_id: source_id.to_owned(),
                manifests: vec![manifest],
            })
            .await;

        Ok(())
    }
}
