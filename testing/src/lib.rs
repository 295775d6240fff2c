//! # EventDesk Testing
//!
//! Testing utilities for the EventDesk synchronization crates.
//!
//! This crate provides:
//! - [`InMemoryRemote`]: an in-memory remote API with call recording, fetch
//!   gates and failure injection
//! - [`FixedClock`]: deterministic time
//! - [`init_tracing`]: log output for tests, filtered by `RUST_LOG`
//!
//! ## Example
//!
//! ```ignore
//! use eventdesk_testing::InMemoryRemote;
//! use eventdesk_runtime::QueryCache;
//!
//! #[tokio::test]
//! async fn test_company_list() {
//!     let remote = Arc::new(InMemoryRemote::new());
//!     remote.seed(ResourceKind::Companies, [json!({"id": "c1", "name": "Acme"})]);
//!
//!     let cache = QueryCache::new(remote.clone());
//!     let companies: Vec<Company> = cache.query(Filters::new()).await.unwrap();
//!     assert_eq!(companies.len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use eventdesk_core::environment::Clock;

/// In-memory remote API
pub mod remote_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use eventdesk_testing::mocks::FixedClock;
    /// use eventdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a test-friendly tracing subscriber (idempotent)
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use remote_mocks::{Call, FetchGate, InMemoryRemote, Operation};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
