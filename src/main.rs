mod config;
mod events;
mod manifest;
mod name_codec;
mod runtime;
mod sources;
mod state_store;
mod sync;
mod translator;

use std::collections::HashMap;
use std::{env, fs, sync::Arc, time::Duration};

use anyhow::Context;
use config::Config;
use runtime::podman::PodmanRuntime;
use runtime::RuntimeDriver;
use state_store::EtcdStateStore;
use sync::SyncEngine;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::events::EventRecorder;
use crate::manifest::ContainerManifest;
use crate::sources::{etcd_source::EtcdSource, file::FileSource, http::HttpSource, SourceUpdate};
use crate::state_store::StateStore;

fn load_config() -> anyhow::Result<Config> {
    match env::args().len() {
        0 | 1 => Ok(Default::default()),
        2 => {
            let arg = env::args().nth(1).expect("should have arg 1");
            let contents = fs::read_to_string(&arg)
                .context("could not read configuration file")
                .context(arg)?;
            let cfg = toml::from_str(&contents).context("failed to parse configuration")?;

            Ok(cfg)
        }
        _ => Err(anyhow::anyhow!(
            "expected at most one command arg, pointing to a config file"
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("could not load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| (&cfg.agent.log).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!(?cfg, "loaded configuration");

    let state_store: Arc<dyn StateStore> =
        Arc::new(EtcdStateStore::new(cfg.state_store.endpoint.clone()));
    let events = Arc::new(EventRecorder::new(state_store.clone()));

    let driver = RuntimeDriver::new(PodmanRuntime::new(&cfg.runtime.podman_path));
    let sync_engine = SyncEngine::new(driver, events);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (update_tx, update_rx) = mpsc::channel::<SourceUpdate>(16);

    let mut source_tasks = Vec::new();

    if let Some(file_cfg) = &cfg.sources.file {
        let source = FileSource::new(file_cfg.path.clone(), file_cfg.poll_period);
        source_tasks.push(tokio::spawn(
            source.run(update_tx.clone(), shutdown_rx.clone()),
        ));
    }

    if let Some(http_cfg) = &cfg.sources.http {
        let source = HttpSource::new(http_cfg.url.clone(), http_cfg.poll_period);
        source_tasks.push(tokio::spawn(
            source.run(update_tx.clone(), shutdown_rx.clone()),
        ));
    }

    if let Some(etcd_cfg) = &cfg.sources.etcd {
        let prefix = cfg.state_store.host_prefix(&etcd_cfg.machine_id);
        let source = EtcdSource::new(state_store.clone(), prefix);
        source_tasks.push(tokio::spawn(
            source.run(update_tx.clone(), shutdown_rx.clone()),
        ));
    }
    drop(update_tx);

    let sync_period = cfg.agent.sync_period;
    let sync_task = tokio::spawn(run_sync_loop(
        sync_engine,
        update_rx,
        sync_period,
        shutdown_rx.clone(),
    ));

    info!("node agent started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    for task in source_tasks {
        let _ = task.await;
    }
    let _ = sync_task.await;

    Ok(())
}

/// Owns the merged desired-state view (one slot per source) and reconciles
/// it on a timer or whenever any source adapter emits (spec.md §4.4.4, §4.6).
async fn run_sync_loop(
    engine: SyncEngine<PodmanRuntime>,
    mut update_rx: mpsc::Receiver<SourceUpdate>,
    sync_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut slots: HashMap<String, Vec<ContainerManifest>> = HashMap::new();
    let mut ticker = tokio::time::interval(sync_period);

    loop {
        tokio::select! {
            update = update_rx.recv() => {
                if let Some(update) = update {
                    slots.insert(update.source_id, update.manifests);
                }
            }
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
                continue;
            }
        }

        let desired: Vec<ContainerManifest> = slots.values().flatten().cloned().collect();
        engine.sync_once(&desired).await;
    }
}
