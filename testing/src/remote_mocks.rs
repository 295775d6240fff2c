//! In-memory remote API for deterministic tests
//!
//! [`InMemoryRemote`] implements [`ResourceClient`] over hash maps and records
//! every call. Tests can:
//! - seed collections and inspect what the "server" holds
//! - hold a fetch open with a [`FetchGate`] and resolve it later, in any order
//! - make the next call of a given [`Operation`] fail with a chosen error
//! - wait until a number of calls has arrived
//!
//! Temporary uploads get sequential ids (`tmp_1`, `tmp_2`, ...). A create or
//! update whose payload mentions a temporary id promotes that upload to
//! permanent media, the way the real server does when an entity is saved.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use async_trait::async_trait;
use eventdesk_client::{ClientError, MediaUpload, ResourceClient, TempMediaHandle, TempMediaId};
use eventdesk_core::key::{FilterValue, QueryKey};
use eventdesk_core::resource::ResourceKind;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// Kind of call received by the remote
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `fetch`
    Fetch,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `upload_media`
    Upload,
    /// `delete_temp_media`
    DeleteTempMedia,
}

/// One recorded call
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    /// `fetch(key)`
    Fetch(QueryKey),
    /// `create(resource, payload)`
    Create {
        /// Target collection
        resource: ResourceKind,
        /// Body sent
        payload: Value,
    },
    /// `update(resource, id, payload)`
    Update {
        /// Target collection
        resource: ResourceKind,
        /// Entity id
        id: String,
        /// Body sent
        payload: Value,
    },
    /// `delete(resource, id)`
    Delete {
        /// Target collection
        resource: ResourceKind,
        /// Entity id
        id: String,
    },
    /// `upload_media(file)`
    Upload {
        /// Uploaded file name
        file_name: String,
    },
    /// `delete_temp_media(id)`
    DeleteTempMedia(TempMediaId),
}

impl Call {
    /// Kind of call
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Fetch(_) => Operation::Fetch,
            Self::Create { .. } => Operation::Create,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
            Self::Upload { .. } => Operation::Upload,
            Self::DeleteTempMedia(_) => Operation::DeleteTempMedia,
        }
    }
}

/// Holds one fetch open until the test resolves it
#[derive(Debug)]
pub struct FetchGate {
    tx: oneshot::Sender<Result<Value, ClientError>>,
}

impl FetchGate {
    /// Complete the held fetch with `value`
    pub fn respond(self, value: Value) {
        let _ = self.tx.send(Ok(value));
    }

    /// Complete the held fetch with `error`
    pub fn fail(self, error: ClientError) {
        let _ = self.tx.send(Err(error));
    }
}

#[derive(Default)]
struct State {
    records: HashMap<ResourceKind, BTreeMap<String, Value>>,
    temp_media: BTreeMap<TempMediaId, TempMediaHandle>,
    media: BTreeMap<TempMediaId, TempMediaHandle>,
    next_id: u64,
    calls: Vec<Call>,
    failures: HashMap<Operation, VecDeque<ClientError>>,
    gates: HashMap<QueryKey, VecDeque<oneshot::Receiver<Result<Value, ClientError>>>>,
    latency: Duration,
}

impl State {
    fn take_failure(&mut self, operation: Operation) -> Result<(), ClientError> {
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn promote_mentioned(&mut self, payload: &Value) {
        let mut mentioned = Vec::new();
        collect_strings(payload, &mut mentioned);
        for id in mentioned {
            let id = TempMediaId::new(id);
            if let Some(handle) = self.temp_media.remove(&id) {
                self.media.insert(id, handle);
            }
        }
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn not_found(what: &str) -> ClientError {
    ClientError::from_response(404, &format!(r#"{{"message":"{what} not found."}}"#))
}

fn matches_filter(record: &Value, name: &str, filter: &FilterValue) -> bool {
    let field = if name == "search" { "name" } else { name };
    let Some(actual) = record.get(field) else {
        return false;
    };
    let actual = match actual {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match filter {
        FilterValue::Text(text) if name == "search" => {
            actual.to_lowercase().contains(&text.to_lowercase())
        }
        FilterValue::Many(values) => values.contains(&actual),
        other => actual == other.render(),
    }
}

/// In-memory [`ResourceClient`] with call recording and fault injection
pub struct InMemoryRemote {
    state: Mutex<State>,
    call_count: watch::Sender<usize>,
}

impl InMemoryRemote {
    /// Empty remote
    #[must_use]
    pub fn new() -> Self {
        let (call_count, _rx) = watch::channel(0);
        Self {
            state: Mutex::new(State::default()),
            call_count,
        }
    }

    /// Delay every call by `latency`
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().latency = latency;
        self
    }

    /// Store `records` in `resource`; each must carry a string `id`
    pub fn seed(&self, resource: ResourceKind, records: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock().unwrap();
        let collection = state.records.entry(resource).or_default();
        for record in records {
            let id = record["id"].as_str().unwrap().to_string();
            collection.insert(id, record);
        }
    }

    /// Records currently held for `resource`, ordered by id
    #[must_use]
    pub fn records(&self, resource: ResourceKind) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&resource)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: ClientError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Hold the next fetch of `key` open until the returned gate is resolved
    ///
    /// Gates for the same key are consumed in the order they were created.
    #[must_use]
    pub fn hold_next_fetch(&self, key: &QueryKey) -> FetchGate {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .unwrap()
            .gates
            .entry(key.clone())
            .or_default()
            .push_back(rx);
        FetchGate { tx }
    }

    /// Every call received so far, in arrival order
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls of `operation`
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Number of fetches of exactly `key`
    #[must_use]
    pub fn fetch_count(&self, key: &QueryKey) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Fetch(k) if k == key))
            .count()
    }

    /// Number of `delete_temp_media` calls for `id`
    #[must_use]
    pub fn temp_delete_count(&self, id: &TempMediaId) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::DeleteTempMedia(i) if i == id))
            .count()
    }

    /// Whether `id` is still in temporary storage
    #[must_use]
    pub fn has_temp_media(&self, id: &TempMediaId) -> bool {
        self.state.lock().unwrap().temp_media.contains_key(id)
    }

    /// Whether `id` was promoted to permanent media by a save
    #[must_use]
    pub fn has_committed_media(&self, id: &TempMediaId) -> bool {
        self.state.lock().unwrap().media.contains_key(id)
    }

    /// Wait until at least `n` calls have been received
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Record `call` and return the configured latency
    fn record(&self, call: Call) -> Duration {
        let (count, latency) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            (state.calls.len(), state.latency)
        };
        self.call_count.send_replace(count);
        latency
    }

    async fn pause(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn query(&self, key: &QueryKey) -> Value {
        let state = self.state.lock().unwrap();
        let records = state
            .records
            .get(&key.resource())
            .map(|collection| {
                collection
                    .values()
                    .filter(|record| {
                        key.filters()
                            .iter()
                            .all(|(name, filter)| matches_filter(record, name, filter))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Value::Array(records)
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRemote")
            .field("calls", &self.state.lock().unwrap().calls.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResourceClient for InMemoryRemote {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, ClientError> {
        let latency = self.record(Call::Fetch(key.clone()));
        let (gate, failure) = {
            let mut state = self.state.lock().unwrap();
            let gate = state.gates.get_mut(key).and_then(VecDeque::pop_front);
            (gate, state.take_failure(Operation::Fetch))
        };

        Self::pause(latency).await;

        if let Some(gate) = gate {
            return gate.await.unwrap_or_else(|_| {
                Err(ClientError::Network {
                    status: None,
                    message: "fetch gate dropped".to_string(),
                })
            });
        }
        failure?;
        Ok(self.query(key))
    }

    async fn create(&self, resource: ResourceKind, payload: Value) -> Result<Value, ClientError> {
        let latency = self.record(Call::Create {
            resource,
            payload: payload.clone(),
        });
        Self::pause(latency).await;

        let mut state = self.state.lock().unwrap();
        state.take_failure(Operation::Create)?;

        let id = format!("{resource}-{}", state.next_id());
        let mut record = payload;
        if let Value::Object(map) = &mut record {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        state.promote_mentioned(&record);
        state
            .records
            .entry(resource)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        resource: ResourceKind,
        id: &str,
        payload: Value,
    ) -> Result<Value, ClientError> {
        let latency = self.record(Call::Update {
            resource,
            id: id.to_string(),
            payload: payload.clone(),
        });
        Self::pause(latency).await;

        let mut state = self.state.lock().unwrap();
        state.take_failure(Operation::Update)?;

        let exists = state
            .records
            .get(&resource)
            .is_some_and(|collection| collection.contains_key(id));
        if !exists {
            return Err(not_found(resource.as_str()));
        }

        let mut record = payload;
        if let Value::Object(map) = &mut record {
            map.insert("id".to_string(), Value::String(id.to_string()));
        }
        state.promote_mentioned(&record);
        state
            .records
            .entry(resource)
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, resource: ResourceKind, id: &str) -> Result<(), ClientError> {
        let latency = self.record(Call::Delete {
            resource,
            id: id.to_string(),
        });
        Self::pause(latency).await;

        let mut state = self.state.lock().unwrap();
        state.take_failure(Operation::Delete)?;
        state
            .records
            .get_mut(&resource)
            .and_then(|collection| collection.remove(id))
            .map(|_| ())
            .ok_or_else(|| not_found(resource.as_str()))
    }

    async fn upload_media(&self, upload: MediaUpload) -> Result<TempMediaHandle, ClientError> {
        let latency = self.record(Call::Upload {
            file_name: upload.file_name.clone(),
        });
        Self::pause(latency).await;

        let mut state = self.state.lock().unwrap();
        state.take_failure(Operation::Upload)?;

        let id = TempMediaId::new(format!("tmp_{}", state.next_id()));
        let handle = TempMediaHandle {
            url: Some(format!("https://cdn.test/tmp/{id}")),
            id: id.clone(),
            file_name: upload.file_name,
            mime_type: upload.mime_type,
            size: upload.bytes.len() as u64,
        };
        state.temp_media.insert(id, handle.clone());
        Ok(handle)
    }

    async fn delete_temp_media(&self, id: &TempMediaId) -> Result<(), ClientError> {
        let latency = self.record(Call::DeleteTempMedia(id.clone()));
        Self::pause(latency).await;

        let mut state = self.state.lock().unwrap();
        state.take_failure(Operation::DeleteTempMedia)?;
        state
            .temp_media
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("Temporary media"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdesk_core::key::Filters;
    use serde_json::json;

    #[tokio::test]
    async fn test_filters_apply_to_seeded_records() {
        let remote = InMemoryRemote::new();
        remote.seed(
            ResourceKind::Companies,
            [
                json!({"id": "c1", "name": "Acme Corp", "country": "FR"}),
                json!({"id": "c2", "name": "Globex", "country": "FR"}),
                json!({"id": "c3", "name": "Acme GmbH", "country": "DE"}),
            ],
        );

        let key = QueryKey::new(
            ResourceKind::Companies,
            Filters::new().with("search", "acme").with("country", "FR"),
        );
        let result = remote.fetch(&key).await.unwrap();
        assert_eq!(result, json!([{"id": "c1", "name": "Acme Corp", "country": "FR"}]));
        assert_eq!(remote.fetch_count(&key), 1);
    }

    #[tokio::test]
    async fn test_save_promotes_mentioned_uploads() {
        let remote = InMemoryRemote::new();
        let handle = remote
            .upload_media(MediaUpload::new("logo.png", "image/png", vec![1]))
            .await
            .unwrap();
        assert!(remote.has_temp_media(&handle.id));

        remote
            .create(ResourceKind::Companies, json!({"name": "Acme", "logo": handle.id}))
            .await
            .unwrap();

        assert!(!remote.has_temp_media(&handle.id));
        assert!(remote.has_committed_media(&handle.id));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let remote = InMemoryRemote::new();
        remote.fail_next(
            Operation::Upload,
            ClientError::Network {
                status: Some(503),
                message: "unavailable".to_string(),
            },
        );

        let upload = MediaUpload::new("a.png", "image/png", vec![]);
        assert!(remote.upload_media(upload.clone()).await.is_err());
        assert!(remote.upload_media(upload).await.is_ok());
        assert_eq!(remote.count(Operation::Upload), 2);
    }
}
