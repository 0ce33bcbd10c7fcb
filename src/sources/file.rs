//! Periodic re-read of a local manifest file.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{ChangeDetector, SourceUpdate};
use crate::manifest::ContainerManifest;

pub struct FileSource {
    path: PathBuf,
    period: Duration,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, period: Duration) -> Self {
        Self {
            path: path.into(),
            period,
        }
    }

    /// Runs the poll loop until `shutdown` fires. Emits one
    /// [`ContainerManifest`] per observed change onto `tx`.
    pub async fn run(self, tx: mpsc::Sender<SourceUpdate>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let source_id = format!("file:{}", self.path.display());
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
                error!(%err, path = %self.path.display(), "file source poll failed");
            }
        }
    }

    async fn poll_once(
        &self,
        source_id: &str,
        detector: &mut ChangeDetector,
        tx: &mpsc::Sender<SourceUpdate>,
    ) -> anyhow::Result<()> {
        let bytes = tokio::fs::read(&self.path).await?;
        let manifest: ContainerManifest = serde_yaml::from_slice(&bytes)?;

        if !detector.changed(&bytes) {
            return Ok(());
        }

        debug!(id = %manifest.id, "file source observed a changed manifest");
        let _ = tx
            .send(SourceUpdate {
                source_id: source_id.to_owned(),
                manifests: vec![manifest],
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn emits_once_on_change() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id: foo").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let source = FileSource::new(file.path(), Duration::from_millis(10));
        let mut detector = ChangeDetector::new();

        source
            .poll_once("file:test", &mut detector, &tx)
            .await
            .unwrap();
        let update = rx.try_recv().expect("should have emitted");
        assert_eq!(update.manifests[0].id, "foo");

        // Unchanged content: no further emission.
        source
            .poll_once("file:test", &mut detector, &tx)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emits_again_when_file_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id: foo").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let source = FileSource::new(file.path(), Duration::from_millis(10));
        let mut detector = ChangeDetector::new();

        source
            .poll_once("file:test", &mut detector, &tx)
            .await
            .unwrap();
        rx.try_recv().unwrap();

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(file.path())
            .unwrap();
        writeln!(file, "id: bar").unwrap();

        source
            .poll_once("file:test", &mut detector, &tx)
            .await
            .unwrap();
        let update = rx.try_recv().expect("should have emitted again");
        assert_eq!(update.manifests[0].id, "bar");
    }

    #[tokio::test]
    async fn surfaces_read_error_without_touching_snapshot() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = FileSource::new("/no/such/file", Duration::from_millis(10));
        let mut detector = ChangeDetector::new();

        let result = source.poll_once("file:test", &mut detector, &tx).await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn parse_error_does_not_update_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id: foo").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let source = FileSource::new(file.path(), Duration::from_millis(10));
        let mut detector = ChangeDetector::new();

        source.poll_once("file:test", &mut detector, &tx).await.unwrap();
        rx.try_recv().unwrap();

        let mut handle = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(file.path())
            .unwrap();
        writeln!(handle, "not: [valid, yaml").unwrap();
        assert!(source.poll_once("file:test", &mut detector, &tx).await.is_err());
        assert!(rx.try_recv().is_err());

        let mut handle = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(file.path())
            .unwrap();
        writeln!(handle, "id: foo").unwrap();
        source.poll_once("file:test", &mut detector, &tx).await.unwrap();
        assert!(
            rx.try_recv().is_err(),
            "snapshot should still be 'id: foo' from before the parse error"
        );
    }
}
