//! Best-effort event logging. Sync correctness never depends on these
//! writes succeeding (spec.md §4.5, §9).

use std::sync::Arc;

use tracing::warn;

use crate::manifest::Event;
use crate::state_store::StateStore;

pub struct EventRecorder {
    store: Arc<dyn StateStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Serializes `event` and appends it as a new child under
    /// `/events/<container.name>/`. Errors are surfaced to the caller; there
    /// is no retry.
    pub async fn log_event(&self, event: &Event) -> anyhow::Result<u64> {
        let dir = format!("/events/{}", event.container.name);
        let payload = serde_json::to_string(event)?;
        let index = self.store.append_child(&dir, &payload).await?;
        Ok(index)
    }

    /// Calls [`log_event`] and swallows the error after logging it, for the
    /// sync engine's fire-and-forget usage.
    ///
    /// [`log_event`]: Self::log_event
    pub async fn log_best_effort(&self, event: Event) {
        if let Err(err) = self.log_event(&event).await {
            warn!(%err, event = %event.event, container = %event.container.name, "failed to record event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::fake::FakeStateStore;

    #[tokio::test]
    async fn log_event_increments_index_and_round_trips() {
        let store = Arc::new(FakeStateStore::new());
        let recorder = EventRecorder::new(store.clone());

        let event = Event::new("started", "foo");
        let index = recorder.log_event(&event).await.unwrap();
        assert_eq!(index, 1);

        let raw = store.get_raw("/events/foo/1").expect("should have written");
        let round_tripped: Event = serde_json::from_str(&raw).unwrap();
        assert_eq!(round_tripped, event);
    }

    #[tokio::test]
    async fn log_best_effort_never_panics_on_failure() {
        struct AlwaysFails;

        #[async_trait::async_trait]
        impl StateStore for AlwaysFails {
            async fn get(
                &self,
                _key: &str,
            ) -> Result<crate::state_store::GetOutcome, crate::state_store::StateStoreError> {
                unimplemented!()
            }
            async fn watch(
                &self,
                _key: &str,
                _after_index: u64,
            ) -> Result<crate::state_store::WatchEvent, crate::state_store::StateStoreError> {
                unimplemented!()
            }
            async fn append_child(
                &self,
                _dir: &str,
                _value: &str,
            ) -> Result<u64, crate::state_store::StateStoreError> {
                Err(crate::state_store::StateStoreError::Protocol(
                    "nope".into(),
                ))
            }
        }

        let recorder = EventRecorder::new(Arc::new(AlwaysFails));
        recorder.log_best_effort(Event::new("started", "foo")).await;
    }
}
