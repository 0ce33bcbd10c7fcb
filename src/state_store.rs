//! Client for the cluster's state store: a key read, a key watch, and an
//! append-child write. This is the full RPC surface the core consumes; the
//! store's replication, consensus, and authentication are out of scope
//! (spec.md §1).
//!
//! [`EtcdStateStore`] speaks the etcd v2 HTTP key-value API over `reqwest`,
//! mirroring etcd v2's own error codes — in particular error code 100,
//! `EcodeKeyNotFound`, which spec.md §6/§8 calls out by number.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// etcd v2's "key not found" error code.
const ECODE_KEY_NOT_FOUND: i64 = 100;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("state store protocol error: {0}")]
    Protocol(String),
}

/// Outcome of a single-key read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Found { value: String, modified_index: u64 },
    NotFound,
}

/// Outcome of one watch iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub value: String,
    pub modified_index: u64,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads a single key. Distinguishes "absent" (etcd code 100) from
    /// every other failure, which is an error (spec.md §4.4.3).
    async fn get(&self, key: &str) -> Result<GetOutcome, StateStoreError>;

    /// Long-polls `key` for the next change after `after_index`. Blocks
    /// until a change is observed or the underlying transport times out.
    async fn watch(&self, key: &str, after_index: u64) -> Result<WatchEvent, StateStoreError>;

    /// Appends `value` as a new child under `dir`, returning the index the
    /// store assigned. The caller never picks the index (spec.md §4.5).
    async fn append_child(&self, dir: &str, value: &str) -> Result<u64, StateStoreError>;
}

/// etcd v2 HTTP API client.
pub struct EtcdStateStore {
    client: reqwest::Client,
    endpoint: String,
}

impl EtcdStateStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn keys_url(&self, key: &str) -> String {
        format!("{}/v2/keys{}", self.endpoint.trim_end_matches('/'), key)
    }
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    key: String,
    value: Option<String>,
    #[serde(rename = "modifiedIndex")]
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: Option<EtcdNode>,
    #[serde(rename = "errorCode")]
    error_code: Option<i64>,
    message: Option<String>,
}

#[async_trait]
impl StateStore for EtcdStateStore {
    async fn get(&self, key: &str) -> Result<GetOutcome, StateStoreError> {
        let response = self.client.get(self.keys_url(key)).send().await?;
        let body: EtcdResponse = response.json().await?;

        match (body.node, body.error_code) {
            (Some(node), _) => match node.value {
                Some(value) => Ok(GetOutcome::Found {
                    value,
                    modified_index: node.modified_index,
                }),
                None => Err(StateStoreError::Protocol(format!(
                    "key {} is a directory, not a value",
                    node.key
                ))),
            },
            (None, Some(ECODE_KEY_NOT_FOUND)) => Ok(GetOutcome::NotFound),
            (None, Some(code)) => Err(StateStoreError::Protocol(format!(
                "errorCode {code}: {}",
                body.message.unwrap_or_default()
            ))),
            (None, None) => Err(StateStoreError::Protocol(
                "response had neither a node nor an error code".into(),
            )),
        }
    }

    async fn watch(&self, key: &str, after_index: u64) -> Result<WatchEvent, StateStoreError> {
        let url = format!(
            "{}?wait=true&waitIndex={}",
            self.keys_url(key),
            after_index + 1
        );
        let response = self.client.get(url).send().await?;
        let body: EtcdResponse = response.json().await?;

        let node = body
            .node
            .ok_or_else(|| StateStoreError::Protocol("watch response had no node".into()))?;
        let value = node
            .value
            .ok_or_else(|| StateStoreError::Protocol("watch response had no value".into()))?;

        Ok(WatchEvent {
            value,
            modified_index: node.modified_index,
        })
    }

    async fn append_child(&self, dir: &str, value: &str) -> Result<u64, StateStoreError> {
        let response = self
            .client
            .post(self.keys_url(dir))
            .form(&[("value", value)])
            .send()
            .await?;
        let body: EtcdResponse = response.json().await?;
        let node = body
            .node
            .ok_or_else(|| StateStoreError::Protocol("create response had no node".into()))?;
        Ok(node.modified_index)
    }
}

/// In-memory state store used by tests. Assigns a plain, per-directory
/// incrementing decimal index so event-write tests can assert on the exact
/// resulting key (spec.md §8 scenario 12).
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeStateStore {
        values: Mutex<HashMap<String, String>>,
        next_child_index: Mutex<HashMap<String, u64>>,
    }

    impl FakeStateStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, key: &str, value: &str) {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_owned(), value.to_owned());
        }

        pub fn get_raw(&self, key: &str) -> Option<String> {
            self.values.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl StateStore for FakeStateStore {
        async fn get(&self, key: &str) -> Result<GetOutcome, StateStoreError> {
            match self.values.lock().unwrap().get(key) {
                Some(value) => Ok(GetOutcome::Found {
                    value: value.clone(),
                    modified_index: 0,
                }),
                None => Ok(GetOutcome::NotFound),
            }
        }

        async fn watch(&self, _key: &str, _after_index: u64) -> Result<WatchEvent, StateStoreError> {
            std::future::pending().await
        }

        async fn append_child(&self, dir: &str, value: &str) -> Result<u64, StateStoreError> {
            let mut counters = self.next_child_index.lock().unwrap();
            let index = counters.entry(dir.to_owned()).or_insert(0);
            *index += 1;
            let assigned = *index;
            drop(counters);

            let key = format!("{}/{assigned}", dir.trim_end_matches('/'));
            self.values.lock().unwrap().insert(key, value.to_owned());
            Ok(assigned)
        }
    }
}
