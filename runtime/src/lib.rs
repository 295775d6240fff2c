//! # EventDesk Runtime
//!
//! Client-side synchronization for EventDesk resources.
//!
//! ## Core Components
//!
//! - **Query Cache**: keyed cache of fetched collections with request
//!   deduplication and a per-key stale-response guard
//! - **Mutation Tracker**: create/update/delete with a busy flag and the
//!   outcome of the latest call, invalidating affected queries on success
//! - **Media Session**: tracks temporary uploads owned by one form so they can
//!   be committed with the entity or released when the form is abandoned
//!
//! ## Example
//!
//! ```ignore
//! use eventdesk_runtime::{MediaSession, MutationTracker, QueryCache};
//!
//! let cache = QueryCache::new(client.clone());
//! let companies = cache.subscribe(QueryKey::all(ResourceKind::Companies)).await;
//!
//! let tracker = MutationTracker::new(client.clone()).with_cache(cache.clone());
//! let session = MediaSession::new(client.clone());
//!
//! let logo = session.upload(MediaUpload::new("logo.png", "image/png", bytes)).await?;
//! let company = Company { name: "Acme".into(), logo: Some(logo.to_ref()), ..Company::default() };
//! session.submit(&tracker, MutationOp::create(&company)?).await?;
//! ```

use eventdesk_client::{ClientError, TempMediaId};
use eventdesk_core::cancel::Cancelled;

/// Keyed query cache with request deduplication
pub mod cache;

/// Temporary media lifecycle per owning form
pub mod media;

/// Metric descriptions and exporter installation
pub mod metrics;

/// Create/update/delete tracking
pub mod mutation;

/// Error types for the synchronization runtime
pub mod error {
    use super::{Cancelled, ClientError, TempMediaId};
    use crate::media::HandleState;
    use thiserror::Error;

    /// Errors surfaced by the cache, mutation tracker and media sessions
    #[derive(Error, Debug)]
    pub enum SyncError {
        /// The remote call failed
        ///
        /// Carries the network/validation/authorization taxonomy of the
        /// client. Nothing in the runtime retries these.
        #[error(transparent)]
        Client(#[from] ClientError),

        /// The caller's cancellation token fired before the result arrived
        ///
        /// The remote request may still have completed.
        #[error("Operation cancelled")]
        Cancelled,

        /// The cache entry was removed while a subscriber was waiting on it
        #[error("Cache entry for {0} was removed")]
        EntryRemoved(String),

        /// The handle was never uploaded through this session
        #[error("Media handle {0} is not tracked by this session")]
        UnknownHandle(TempMediaId),

        /// The handle's lifecycle state does not allow the operation
        #[error("Media handle {id} is {state} and cannot be {action}")]
        InvalidHandle {
            /// Handle involved
            id: TempMediaId,
            /// Its current state
            state: HandleState,
            /// What was attempted
            action: &'static str,
        },

        /// A spawned request task panicked or was aborted
        #[error("Task failed: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),
    }

    impl From<Cancelled> for SyncError {
        fn from(_: Cancelled) -> Self {
            Self::Cancelled
        }
    }

    impl SyncError {
        /// The underlying client error, if any
        #[must_use]
        pub const fn client_error(&self) -> Option<&ClientError> {
            match self {
                Self::Client(e) => Some(e),
                _ => None,
            }
        }
    }
}

pub use cache::{CacheEntry, QueryCache, Subscription};
pub use error::SyncError;
pub use media::{HandleState, MediaSession};
pub use mutation::{MutationKind, MutationOp, MutationRecord, MutationTracker};
