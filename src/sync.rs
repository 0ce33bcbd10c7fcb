//! The reconciliation loop: compares a desired manifest set against
//! observed runtime state and drives the runtime driver to close the gap.
//!
//! Grounded in the teacher's `synchronize_all` / `synchronize_container_state`
//! pair: fetch-then-converge, one best-effort step per managed entity, errors
//! logged and skipped rather than aborting the whole tick.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};

use crate::events::EventRecorder;
use crate::manifest::{ContainerManifest, Event};
use crate::name_codec;
use crate::runtime::{ContainerRuntime, RuntimeDriver};
use crate::translator;

macro_rules! try_continue {
    ($ex:expr, $event:expr) => {
        match $ex {
            Ok(v) => v,
            Err(err) => {
                error!(%err, $event);
                continue;
            }
        }
    };
}

pub struct SyncEngine<R> {
    driver: RuntimeDriver<R>,
    events: Arc<EventRecorder>,
}

impl<R> SyncEngine<R>
where
    R: ContainerRuntime,
{
    pub fn new(driver: RuntimeDriver<R>, events: Arc<EventRecorder>) -> Self {
        Self { driver, events }
    }

    /// Runs one reconciliation tick against `desired` (§4.6). Creates
    /// precede deletes so a manifest rename never transiently empties a
    /// service of all instances.
    pub async fn sync_once(&self, desired: &[ContainerManifest]) {
        self.create_missing(desired).await;
        self.stop_unwanted(desired).await;
    }

    async fn create_missing(&self, desired: &[ContainerManifest]) {
        for manifest in desired {
            for container in &manifest.containers {
                let existence = try_continue!(
                    self.driver
                        .container_exists(&manifest.id, &container.name)
                        .await,
                    "failed to query container existence"
                );

                if existence.exists {
                    continue;
                }

                let image = match container.extra_str("image") {
                    Some(image) => image.to_owned(),
                    None => {
                        error!(container = %container.name, "manifest container has no image field");
                        self.events
                            .log_best_effort(Event::new("create_failed", &container.name))
                            .await;
                        continue;
                    }
                };

                let spec = translator::translate(container);
                match self
                    .driver
                    .create_and_start(&manifest.id, &container.name, &image, &spec)
                    .await
                {
                    Ok(_) => {
                        info!(container = %container.name, manifest = %manifest.id, "created and started container");
                        self.events
                            .log_best_effort(Event::new("created", &container.name))
                            .await;
                    }
                    Err(err) => {
                        error!(%err, container = %container.name, "failed to create container");
                        self.events
                            .log_best_effort(Event::new("create_failed", &container.name))
                            .await;
                    }
                }
            }
        }
    }

    async fn stop_unwanted(&self, desired: &[ContainerManifest]) {
        let wanted: HashSet<(String, String)> = desired
            .iter()
            .flat_map(|m| {
                m.containers
                    .iter()
                    .map(move |c| (m.id.clone(), c.name.clone()))
            })
            .collect();

        let names = match self.driver.list_managed().await {
            Ok(names) => names,
            Err(err) => {
                error!(%err, "failed to list containers");
                return;
            }
        };

        for name in names {
            let Some((manifest_id, container_name)) = name_codec::decode(&name) else {
                continue;
            };

            if wanted.contains(&(manifest_id, container_name.clone())) {
                continue;
            }

            match self.driver.kill_container(&name).await {
                Ok(()) => {
                    info!(%name, "stopped unmanaged-by-desired-state container");
                    self.events
                        .log_best_effort(Event::new("stopped", &container_name))
                        .await;
                }
                Err(err) => {
                    error!(%err, %name, "failed to stop container");
                    self.events
                        .log_best_effort(Event::new("stop_failed", &container_name))
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Container;
    use crate::runtime::fake::FakeRuntime;
    use crate::state_store::fake::FakeStateStore;
    use serde_yaml::Value;

    fn manifest(id: &str, containers: Vec<Container>) -> ContainerManifest {
        ContainerManifest {
            id: id.to_owned(),
            containers,
            extra: Value::Null,
        }
    }

    fn container(name: &str, image: &str) -> Container {
        let mut c = Container {
            name: name.to_owned(),
            ..Default::default()
        };
        c.extra = serde_yaml::from_str(&format!("image: {image}")).unwrap();
        c
    }

    fn engine(runtime: Arc<FakeRuntime>) -> (SyncEngine<Arc<FakeRuntime>>, Arc<FakeStateStore>) {
        let store = Arc::new(FakeStateStore::new());
        let events = Arc::new(EventRecorder::new(store.clone()));
        (SyncEngine::new(RuntimeDriver::new(runtime), events), store)
    }

    #[tokio::test]
    async fn creates_missing_container() {
        let runtime = Arc::new(FakeRuntime::new());
        let (engine, _store) = engine(runtime.clone());
        let desired = vec![manifest("m1", vec![container("web", "nginx")])];

        engine.sync_once(&desired).await;

        assert!(runtime.is_running("web--m1"));
    }

    #[tokio::test]
    async fn idempotent_tick_performs_no_create_or_stop() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.seed("abc", "web--m1");
        let (engine, _store) = engine(runtime.clone());
        let desired = vec![manifest("m1", vec![container("web", "nginx")])];

        engine.sync_once(&desired).await;

        assert_eq!(runtime.calls(), vec!["list", "list", "inspect", "list"]);
        assert!(runtime.is_running("web--m1"));
    }

    #[tokio::test]
    async fn stops_container_absent_from_desired_set() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.seed("abc", "web--m1");
        let (engine, _store) = engine(runtime.clone());

        engine.sync_once(&[]).await;

        assert!(!runtime.is_running("web--m1"));
    }

    #[tokio::test]
    async fn unmanaged_container_is_left_alone() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.seed("abc", "standalone");
        let (engine, _store) = engine(runtime.clone());

        engine.sync_once(&[]).await;

        assert!(runtime.is_running("standalone"));
    }

    #[tokio::test]
    async fn rename_creates_before_deleting() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.seed("abc", "web--old");
        let (engine, _store) = engine(runtime.clone());
        let desired = vec![manifest("new", vec![container("web", "nginx")])];

        engine.sync_once(&desired).await;

        assert!(runtime.is_running("web--new"));
        assert!(!runtime.is_running("web--old"));
    }
}
