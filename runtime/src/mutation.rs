//! Mutation tracking.
//!
//! A [`MutationTracker`] belongs to one invoking component (a form, a row's
//! delete button). It exposes a busy flag for as long as any of its calls is
//! outstanding and keeps the record of the most recently started call.
//!
//! Calls are never queued or rejected: a second `mutate` while busy is sent
//! immediately. Debouncing is the caller's job. Trackers do not coordinate
//! with each other, so two components writing the same entity race and the
//! last write to reach the server wins.

use crate::cache::QueryCache;
use crate::error::SyncError;
use eventdesk_client::api::require_id;
use eventdesk_client::codec::{decode_entity, encode_entity};
use eventdesk_client::{ClientError, ResourceClient};
use eventdesk_core::cancel::CancellationToken;
use eventdesk_core::resource::{Resource, ResourceKind};
use eventdesk_core::validation::Validate;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Kind of write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// New entity
    Create,
    /// Replace an existing entity
    Update,
    /// Remove an entity
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A write against a resource
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Create an entity from `payload`
    Create {
        /// Target collection
        resource: ResourceKind,
        /// Entity body
        payload: Value,
    },
    /// Replace entity `id` with `payload`
    Update {
        /// Target collection
        resource: ResourceKind,
        /// Entity id
        id: String,
        /// Entity body
        payload: Value,
    },
    /// Delete entity `id`
    Delete {
        /// Target collection
        resource: ResourceKind,
        /// Entity id
        id: String,
    },
}

impl MutationOp {
    /// Create `entity` after client-side validation
    ///
    /// # Errors
    ///
    /// Returns a validation error without touching the network.
    pub fn create<T: Resource + Validate>(entity: &T) -> Result<Self, SyncError> {
        Ok(Self::Create {
            resource: T::KIND,
            payload: encode_entity(entity)?,
        })
    }

    /// Update `entity` after client-side validation
    ///
    /// # Errors
    ///
    /// Returns a validation error if the entity is invalid or unsaved.
    pub fn update<T: Resource + Validate>(entity: &T) -> Result<Self, SyncError> {
        let payload = encode_entity(entity)?;
        Ok(Self::Update {
            resource: T::KIND,
            id: require_id(entity)?.to_string(),
            payload,
        })
    }

    /// Delete `entity`
    ///
    /// # Errors
    ///
    /// Returns a validation error if the entity was never saved.
    pub fn delete<T: Resource>(entity: &T) -> Result<Self, SyncError> {
        Ok(Self::Delete {
            resource: T::KIND,
            id: require_id(entity)?.to_string(),
        })
    }

    /// Kind of write
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }

    /// Target collection
    #[must_use]
    pub const fn resource(&self) -> ResourceKind {
        match self {
            Self::Create { resource, .. }
            | Self::Update { resource, .. }
            | Self::Delete { resource, .. } => *resource,
        }
    }

    /// Entity body, if the write carries one
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match self {
            Self::Create { payload, .. } | Self::Update { payload, .. } => Some(payload),
            Self::Delete { .. } => None,
        }
    }
}

/// Outcome of the most recently started mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// Kind of write
    pub kind: MutationKind,
    /// Target collection
    pub resource: ResourceKind,
    /// Still waiting for the server
    pub busy: bool,
    /// Server result; `None` while busy or if the caller stopped waiting
    pub result: Option<Result<Value, ClientError>>,
}

#[derive(Default)]
struct LastCall {
    /// Sequence number of the most recently started call
    sequence: u64,
    record: Option<MutationRecord>,
}

struct Inner {
    client: Arc<dyn ResourceClient>,
    busy: watch::Sender<bool>,
    outstanding: AtomicUsize,
    last: Mutex<LastCall>,
}

impl Inner {
    fn last(&self) -> MutexGuard<'_, LastCall> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the record for a new call
    fn begin(&self, kind: MutationKind, resource: ResourceKind) -> u64 {
        let mut last = self.last();
        last.sequence += 1;
        last.record = Some(MutationRecord {
            kind,
            resource,
            busy: true,
            result: None,
        });
        last.sequence
    }

    /// Write the final record, unless a later call has claimed it
    fn finish(&self, sequence: u64, record: MutationRecord) {
        let mut last = self.last();
        if last.sequence == sequence {
            last.record = Some(record);
        }
    }
}

/// One outstanding call
///
/// Dropping an unsettled guard (the caller stopped awaiting) still writes a
/// final record and releases the busy flag.
struct CallGuard<'a> {
    inner: &'a Inner,
    sequence: u64,
    kind: MutationKind,
    resource: ResourceKind,
    settled: bool,
}

impl<'a> CallGuard<'a> {
    fn enter(inner: &'a Inner, kind: MutationKind, resource: ResourceKind) -> Self {
        if inner.outstanding.fetch_add(1, Ordering::AcqRel) > 0 {
            debug!(kind = %kind, resource = %resource, "Mutation issued while another is outstanding");
        }
        inner.busy.send_replace(true);
        let sequence = inner.begin(kind, resource);
        Self {
            inner,
            sequence,
            kind,
            resource,
            settled: false,
        }
    }

    fn settle(mut self, result: Option<Result<Value, ClientError>>) {
        self.write(result);
        self.settled = true;
    }

    fn write(&self, result: Option<Result<Value, ClientError>>) {
        self.inner.finish(
            self.sequence,
            MutationRecord {
                kind: self.kind,
                resource: self.resource,
                busy: false,
                result,
            },
        );
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(kind = %self.kind, resource = %self.resource, "Mutation abandoned by caller");
            self.write(None);
        }
        // The record is final before the flag clears
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.busy.send_replace(false);
        }
    }
}

/// Tracks the writes issued by one component
///
/// Cloning is cheap; clones share the busy flag and record.
#[derive(Clone)]
pub struct MutationTracker {
    inner: Arc<Inner>,
    cache: Option<QueryCache>,
}

impl MutationTracker {
    /// Tracker sending writes through `client`
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        let (busy, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                client,
                busy,
                outstanding: AtomicUsize::new(0),
                last: Mutex::new(LastCall::default()),
            }),
            cache: None,
        }
    }

    /// Invalidate `cache` entries of the mutated resource after each success
    #[must_use]
    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Whether any call is outstanding
    #[must_use]
    pub fn busy(&self) -> bool {
        *self.inner.busy.borrow()
    }

    /// Receiver notified when the busy flag flips
    #[must_use]
    pub fn watch_busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    /// Record of the most recently started call
    #[must_use]
    pub fn last(&self) -> Option<MutationRecord> {
        self.inner.last().record.clone()
    }

    /// Forget the last record (e.g. when the form is reset)
    pub fn reset(&self) {
        self.inner.last().record = None;
    }

    /// Send `op` to the server
    ///
    /// # Errors
    ///
    /// Returns the client error of the failed request. Nothing is retried.
    pub async fn mutate(&self, op: MutationOp) -> Result<Value, SyncError> {
        let inner = &*self.inner;
        let kind = op.kind();
        let resource = op.resource();
        let call = CallGuard::enter(inner, kind, resource);

        let result = match op {
            MutationOp::Create { resource, payload } => inner.client.create(resource, payload).await,
            MutationOp::Update {
                resource,
                id,
                payload,
            } => inner.client.update(resource, &id, payload).await,
            MutationOp::Delete { resource, id } => {
                inner.client.delete(resource, &id).await.map(|()| Value::Null)
            }
        };

        match &result {
            Ok(_) => {
                info!(kind = %kind, resource = %resource, "Mutation succeeded");
                metrics::counter!("mutations.succeeded", "kind" => kind.to_string()).increment(1);
                if let Some(cache) = &self.cache {
                    cache.invalidate_resource(resource);
                }
            }
            Err(e) => {
                warn!(kind = %kind, resource = %resource, error = %e, "Mutation failed");
                metrics::counter!("mutations.failed", "kind" => kind.to_string()).increment(1);
            }
        }

        call.settle(Some(result.clone()));
        Ok(result?)
    }

    /// Send `op`, giving up on the result if `token` is cancelled first
    ///
    /// The request itself is not aborted: it completes in the background and
    /// still updates the record and invalidates the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if the token fires first, otherwise as
    /// [`MutationTracker::mutate`].
    pub async fn mutate_until_cancelled(
        &self,
        op: MutationOp,
        token: &CancellationToken,
    ) -> Result<Value, SyncError> {
        let tracker = self.clone();
        let task = tokio::spawn(async move { tracker.mutate(op).await });
        token.run_until_cancelled(task).await??
    }

    /// Validate and create `entity`, returning the server's version
    ///
    /// # Errors
    ///
    /// Returns a validation error (no request sent), a client error or a decode error.
    pub async fn create<T: Resource + Validate>(&self, entity: &T) -> Result<T, SyncError> {
        let saved = self.mutate(MutationOp::create(entity)?).await?;
        Ok(decode_entity(saved)?)
    }

    /// Validate and update `entity`, returning the server's version
    ///
    /// # Errors
    ///
    /// Returns a validation error (no request sent), a client error or a decode error.
    pub async fn update<T: Resource + Validate>(&self, entity: &T) -> Result<T, SyncError> {
        let saved = self.mutate(MutationOp::update(entity)?).await?;
        Ok(decode_entity(saved)?)
    }

    /// Delete `entity`
    ///
    /// # Errors
    ///
    /// Returns a validation error for unsaved entities, or a client error.
    pub async fn delete<T: Resource>(&self, entity: &T) -> Result<(), SyncError> {
        self.mutate(MutationOp::delete(entity)?).await?;
        Ok(())
    }
}

impl fmt::Debug for MutationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationTracker")
            .field("busy", &self.busy())
            .field("last", &self.last())
            .finish_non_exhaustive()
    }
}
