//! Temporary media lifecycle.
//!
//! A form that lets the user attach files uploads them before the entity is
//! saved. The server keeps those uploads in temporary storage and returns a
//! handle. Each handle moves through:
//!
//! ```text
//! Uploaded ──commit──▶ Committed   (referenced by the saved entity)
//!     │
//!     └─────release──▶ Released    (explicitly deleted)
//! ```
//!
//! A [`MediaSession`] owns the handles of one form instance. `cancel` releases
//! everything still pending; `submit` saves the entity, commits the handles
//! its payload references and releases the ones it does not.
//!
//! A release runs on its own task and always records its outcome, even if
//! the caller stops waiting. Callers that release a handle whose delete is
//! already in flight wait for that delete and get its result.
//!
//! Nothing is released automatically: a session dropped with pending
//! handles only logs a warning. Cleaning up uploads abandoned that way is
//! left to the server.

use crate::error::SyncError;
use crate::mutation::{MutationOp, MutationTracker};
use eventdesk_client::{
    ClientError, MediaRef, MediaUpload, ResourceClient, TempMediaHandle, TempMediaId,
};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a temporary upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Stored temporarily, owned by the session
    Uploaded,
    /// Delete request in flight
    Releasing,
    /// Attached to a saved entity; the session no longer owns it
    Committed,
    /// Deleted from temporary storage
    Released,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded => write!(f, "uploaded"),
            Self::Releasing => write!(f, "releasing"),
            Self::Committed => write!(f, "committed"),
            Self::Released => write!(f, "released"),
        }
    }
}

type PendingRelease = Shared<BoxFuture<'static, Result<(), ClientError>>>;

struct Tracked {
    handle: TempMediaHandle,
    state: HandleState,
    /// Delete in flight, set while `Releasing`
    release: Option<PendingRelease>,
}

type Handles = Mutex<BTreeMap<TempMediaId, Tracked>>;

fn lock(handles: &Handles) -> MutexGuard<'_, BTreeMap<TempMediaId, Tracked>> {
    handles.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record the outcome of a finished delete
fn settle_release(handles: &Handles, id: &TempMediaId, released: bool) {
    if let Some(tracked) = lock(handles).get_mut(id) {
        if tracked.state == HandleState::Releasing {
            tracked.state = if released {
                HandleState::Released
            } else {
                HandleState::Uploaded
            };
            tracked.release = None;
        }
    }
}

/// Temporary uploads owned by one form instance
pub struct MediaSession {
    id: Uuid,
    client: Arc<dyn ResourceClient>,
    handles: Arc<Handles>,
}

impl MediaSession {
    /// New session for a freshly opened form
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "Media session opened");
        Self {
            id,
            client,
            handles: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Session id, for correlating logs
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    fn handles(&self) -> MutexGuard<'_, BTreeMap<TempMediaId, Tracked>> {
        lock(&self.handles)
    }

    /// Upload `file`; the returned handle is tracked as `Uploaded`
    ///
    /// # Errors
    ///
    /// Returns the client error; a failed upload leaves nothing tracked.
    pub async fn upload(&self, file: MediaUpload) -> Result<TempMediaHandle, SyncError> {
        let file_name = file.file_name.clone();
        let handle = self.client.upload_media(file).await.inspect_err(|e| {
            warn!(session = %self.id, file_name = %file_name, error = %e, "Upload failed");
        })?;

        info!(session = %self.id, id = %handle.id, file_name = %file_name, "Media uploaded");
        metrics::counter!("media.uploaded").increment(1);
        self.handles().insert(
            handle.id.clone(),
            Tracked {
                handle: handle.clone(),
                state: HandleState::Uploaded,
                release: None,
            },
        );
        Ok(handle)
    }

    /// Delete an uploaded handle from temporary storage
    ///
    /// The remote delete is issued at most once per handle at a time. A
    /// caller releasing a handle whose delete is already in flight waits for
    /// it and gets its result; releasing a released handle is a no-op. The
    /// delete runs on its own task, so dropping this future does not leave the
    /// handle half released. If the delete fails the handle goes back to
    /// `Uploaded` and can be released again.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownHandle`] for foreign handles,
    /// [`SyncError::InvalidHandle`] for committed ones, or the client error.
    pub async fn release(&self, id: &TempMediaId) -> Result<(), SyncError> {
        let pending = {
            let mut handles = self.handles();
            let tracked = handles
                .get_mut(id)
                .ok_or_else(|| SyncError::UnknownHandle(id.clone()))?;

            match tracked.state {
                HandleState::Uploaded => {
                    let pending = self.spawn_release(id);
                    tracked.state = HandleState::Releasing;
                    tracked.release = Some(pending.clone());
                    pending
                }
                HandleState::Releasing => {
                    let Some(pending) = tracked.release.clone() else {
                        return Ok(());
                    };
                    debug!(session = %self.id, id = %id, "Joining release in flight");
                    pending
                }
                HandleState::Released => return Ok(()),
                HandleState::Committed => {
                    return Err(SyncError::InvalidHandle {
                        id: id.clone(),
                        state: HandleState::Committed,
                        action: "released",
                    });
                }
            }
        };

        Ok(pending.await?)
    }

    /// Start the remote delete of `id`; caller holds the handles lock
    fn spawn_release(&self, id: &TempMediaId) -> PendingRelease {
        let client = Arc::clone(&self.client);
        let handles = Arc::clone(&self.handles);
        let session = self.id;
        let task_id = id.clone();

        let task = tokio::spawn(async move {
            let result = client.delete_temp_media(&task_id).await;
            settle_release(&handles, &task_id, result.is_ok());

            match &result {
                Ok(()) => {
                    info!(session = %session, id = %task_id, "Temporary media released");
                    metrics::counter!("media.released").increment(1);
                }
                Err(e) => {
                    warn!(
                        session = %session,
                        id = %task_id,
                        error = %e,
                        "Temporary media release failed"
                    );
                }
            }
            result
        });

        // Weak: the shared future is stored inside the map it settles
        let handles = Arc::downgrade(&self.handles);
        let id = id.clone();
        task.map(move |joined| {
            joined.unwrap_or_else(|e| {
                // The task ended without recording an outcome
                if let Some(handles) = handles.upgrade() {
                    settle_release(&handles, &id, false);
                }
                Err(ClientError::Network {
                    status: None,
                    message: format!("Release task failed: {e}"),
                })
            })
        })
        .boxed()
        .shared()
    }

    /// Mark a handle as attached to a saved entity
    ///
    /// Committing twice returns the same reference.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownHandle`] for foreign handles or
    /// [`SyncError::InvalidHandle`] for released ones.
    pub fn commit(&self, id: &TempMediaId) -> Result<MediaRef, SyncError> {
        let mut handles = self.handles();
        let tracked = handles
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownHandle(id.clone()))?;

        match tracked.state {
            HandleState::Uploaded => {
                tracked.state = HandleState::Committed;
                debug!(session = %self.id, id = %id, "Temporary media committed");
                metrics::counter!("media.committed").increment(1);
                Ok(tracked.handle.to_ref())
            }
            HandleState::Committed => Ok(tracked.handle.to_ref()),
            state @ (HandleState::Releasing | HandleState::Released) => {
                Err(SyncError::InvalidHandle {
                    id: id.clone(),
                    state,
                    action: "committed",
                })
            }
        }
    }

    /// Upload `file` as the replacement of `old`, then release `old`
    ///
    /// If releasing `old` fails it stays pending (a later `cancel` or
    /// `submit` retries it) and the new handle is still returned.
    ///
    /// # Errors
    ///
    /// Returns the upload error; `old` is untouched in that case.
    pub async fn replace(
        &self,
        old: &TempMediaId,
        file: MediaUpload,
    ) -> Result<TempMediaHandle, SyncError> {
        let handle = self.upload(file).await?;
        if let Err(e) = self.release(old).await {
            warn!(session = %self.id, old = %old, error = %e, "Replaced media could not be released");
        }
        Ok(handle)
    }

    /// State of `id`, if tracked
    #[must_use]
    pub fn state(&self, id: &TempMediaId) -> Option<HandleState> {
        self.handles().get(id).map(|tracked| tracked.state)
    }

    /// Handles still owned by the session
    #[must_use]
    pub fn pending(&self) -> Vec<TempMediaHandle> {
        self.handles()
            .values()
            .filter(|tracked| tracked.state == HandleState::Uploaded)
            .map(|tracked| tracked.handle.clone())
            .collect()
    }

    /// Handles neither committed nor released, including deletes in flight
    fn unsettled(&self) -> Vec<TempMediaId> {
        self.handles()
            .iter()
            .filter(|(_, tracked)| {
                matches!(tracked.state, HandleState::Uploaded | HandleState::Releasing)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Release every pending handle (form cancelled)
    ///
    /// Also waits for deletes already in flight, so every handle is settled
    /// when this returns. All releases are attempted; returns how many
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first release error after attempting all of them.
    pub async fn cancel(&self) -> Result<usize, SyncError> {
        let unsettled = self.unsettled();
        if unsettled.is_empty() {
            return Ok(0);
        }

        info!(session = %self.id, count = unsettled.len(), "Form cancelled, releasing uploads");
        let results = join_all(unsettled.iter().map(|id| self.release(id))).await;

        let mut released = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => released += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    /// Save the owning entity, then settle every pending handle
    ///
    /// On success, handles referenced by the payload are committed and the
    /// rest are released. On failure nothing changes, so the user can fix the
    /// form and submit again, or cancel.
    ///
    /// # Errors
    ///
    /// Returns the mutation error. Release failures after a successful save
    /// are logged, not returned, since the entity is already saved.
    pub async fn submit(&self, tracker: &MutationTracker, op: MutationOp) -> Result<Value, SyncError> {
        let payload = op.payload().cloned().unwrap_or(Value::Null);
        let saved = tracker.mutate(op).await?;

        let mut orphaned = Vec::new();
        for handle in self.pending() {
            if mentions(&payload, handle.id.as_str()) {
                self.commit(&handle.id)?;
            } else {
                orphaned.push(handle.id);
            }
        }

        for id in orphaned {
            if let Err(e) = self.release(&id).await {
                warn!(session = %self.id, id = %id, error = %e, "Unreferenced upload could not be released");
            }
        }

        Ok(saved)
    }
}

impl fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("pending", &self.pending().len())
            .finish_non_exhaustive()
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        // A delete in flight may still fail after the session is gone
        let pending = self.unsettled();

        if !pending.is_empty() {
            warn!(
                session = %self.id,
                count = pending.len(),
                ids = ?pending,
                "Media session dropped with uploads neither committed nor released"
            );
            metrics::counter!("media.orphaned").increment(pending.len() as u64);
        }
    }
}

/// Whether `needle` appears as a string anywhere in `value`
fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s == needle,
        Value::Array(items) => items.iter().any(|item| mentions(item, needle)),
        Value::Object(map) => map.values().any(|item| mentions(item, needle)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}
