//! # EventDesk Core
//!
//! Core types shared by the EventDesk resource synchronization crates.
//!
//! The admin and attendee surfaces of the event platform read and write a
//! handful of remote collections (companies, tickets, media, staff, ...).
//! This crate holds the pieces every layer agrees on:
//!
//! - **Resource kinds**: the closed set of remote collections
//! - **Query keys**: normalized `{resource, filters}` identities for cached reads
//! - **Validation**: client-side checks that block invalid payloads before the network
//! - **Cancellation**: tokens checked at suspension points of view-owned tasks
//! - **Preferences**: explicit language/theme configuration with change notifications
//!
//! ## Example
//!
//! ```
//! use eventdesk_core::key::{Filters, QueryKey};
//! use eventdesk_core::resource::ResourceKind;
//!
//! let a = QueryKey::new(
//!     ResourceKind::Companies,
//!     Filters::new().with("search", "acme").with("page", 2),
//! );
//! let b = QueryKey::new(
//!     ResourceKind::Companies,
//!     Filters::new().with("page", 2).with("search", "acme"),
//! );
//! assert_eq!(a, b);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Cancellation tokens for view-scoped async work
pub mod cancel;

/// Normalized cache keys and filter parameters
pub mod key;

/// Language and theme preferences with change notifications
pub mod preferences;

/// Remote resource kinds and the `Resource` binding trait
pub mod resource;

/// Client-side payload validation
pub mod validation;

/// Environment module - Dependency injection traits
///
/// External dependencies the runtime needs are abstracted behind traits and
/// injected at construction, so tests can substitute deterministic versions.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by `Utc::now`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use cancel::{Cancelled, CancellationToken};
pub use key::{FilterValue, Filters, QueryKey};
pub use preferences::{Language, Preferences, PreferencesStore, ThemeMode};
pub use resource::{Resource, ResourceKind};
pub use validation::{FieldError, Validate, ValidationErrors};
