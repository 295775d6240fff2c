//! Metrics for observability.
//!
//! Counters emitted by the runtime:
//! - `query_cache.*`: hits, misses, deduplicated joins, fetches, superseded
//!   responses, errors, invalidations
//! - `mutations.*`: succeeded / failed, labelled by `kind`
//! - `media.*`: uploaded, committed, released, orphaned
//!
//! Counters are no-ops until a recorder is installed. Applications that want
//! Prometheus output call [`install_prometheus_recorder`] once at start-up
//! and render the returned handle wherever they expose metrics.

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export the counter macro for use in other crates
pub use metrics::counter;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register descriptions for every runtime metric
pub fn register_metrics() {
    describe_counter!("query_cache.hits", "Subscriptions served from cached data");
    describe_counter!("query_cache.misses", "Subscriptions that had to fetch");
    describe_counter!(
        "query_cache.deduplicated",
        "Subscriptions that joined a request already in flight"
    );
    describe_counter!("query_cache.fetches", "Requests issued by the query cache");
    describe_counter!(
        "query_cache.superseded",
        "Responses discarded because a newer request was issued for the same key"
    );
    describe_counter!("query_cache.errors", "Query requests that failed");
    describe_counter!("query_cache.invalidations", "Cache entries marked stale");

    describe_counter!("mutations.succeeded", "Successful create/update/delete calls");
    describe_counter!("mutations.failed", "Failed create/update/delete calls");

    describe_counter!("media.uploaded", "Temporary media uploads");
    describe_counter!("media.committed", "Temporary media attached to a saved entity");
    describe_counter!("media.released", "Temporary media explicitly deleted");
    describe_counter!(
        "media.orphaned",
        "Temporary media left pending when its session was dropped"
    );
}

/// Install a global Prometheus recorder and register descriptions
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a different recorder is already
/// installed.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}
