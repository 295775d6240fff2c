//! Integration tests for the query cache
//!
//! Covers request deduplication, invalidation semantics, the per-key
//! stale-response guard and error handling against an in-memory remote.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use eventdesk_client::ClientError;
use eventdesk_client::types::Company;
use eventdesk_core::cancel::CancellationToken;
use eventdesk_core::environment::Clock;
use eventdesk_core::key::{Filters, QueryKey};
use eventdesk_core::resource::ResourceKind;
use eventdesk_runtime::{CacheEntry, QueryCache, Subscription, SyncError};
use eventdesk_testing::{InMemoryRemote, Operation, init_tracing, test_clock};
use serde_json::{Value, json};
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

fn companies() -> QueryKey {
    QueryKey::all(ResourceKind::Companies)
}

fn seeded_remote() -> Arc<InMemoryRemote> {
    init_tracing();
    let remote = Arc::new(InMemoryRemote::new());
    remote.seed(
        ResourceKind::Companies,
        [
            json!({"id": "c1", "name": "Acme Corp"}),
            json!({"id": "c2", "name": "Globex"}),
        ],
    );
    remote
}

/// Wait until the entry has settled after a change
async fn next_settled(subscription: &mut Subscription) -> CacheEntry {
    loop {
        let entry = subscription.changed().await.unwrap();
        if !entry.loading && !entry.stale {
            return entry;
        }
    }
}

fn names(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["name"].as_str().unwrap())
        .collect()
}

// ============================================================================
// Deduplication
// ============================================================================

#[tokio::test]
async fn test_concurrent_subscribers_share_one_request() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let gate = remote.hold_next_fetch(&companies());

    let (first, second, ()) = tokio::join!(
        cache.subscribe(companies()),
        cache.subscribe(companies()),
        async {
            remote.wait_for_calls(1).await;
            gate.respond(json!([{"id": "c1", "name": "Acme Corp"}]));
        }
    );

    assert_eq!(remote.fetch_count(&companies()), 1);
    assert_eq!(first.entry().data, second.entry().data);
    assert_eq!(names(first.entry().data.as_deref().unwrap()), vec!["Acme Corp"]);
    assert_eq!(cache.subscriber_count(&companies()), 2);
}

#[tokio::test]
async fn test_cached_entry_is_served_without_request() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());

    let first = cache.subscribe(companies()).await;
    let second = cache.subscribe(companies()).await;

    assert_eq!(remote.fetch_count(&companies()), 1);
    assert_eq!(first.entry(), second.entry());
}

#[tokio::test]
async fn test_distinct_filters_are_distinct_entries() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());

    let acme = QueryKey::new(ResourceKind::Companies, Filters::new().with("search", "acme"));
    let all = cache.fetch(companies()).await.unwrap();
    let filtered = cache.fetch(acme.clone()).await.unwrap();

    assert_eq!(names(&all), vec!["Acme Corp", "Globex"]);
    assert_eq!(names(&filtered), vec!["Acme Corp"]);
    assert_eq!(cache.len(), 2);
    assert_eq!(remote.fetch_count(&acme), 1);
}

#[tokio::test]
async fn test_typed_query_decodes_entities() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());

    let found: Vec<Company> = cache
        .query(Filters::new().with("search", "GLOB"))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_deref(), Some("c2"));
    assert_eq!(found[0].name, "Globex");
}

#[tokio::test]
async fn test_fetched_at_uses_injected_clock() {
    let remote = seeded_remote();
    let clock = test_clock();
    let cache = QueryCache::with_clock(remote, Arc::new(clock.clone()));

    let subscription = cache.subscribe(companies()).await;

    assert_eq!(subscription.entry().fetched_at, Some(clock.now()));
}

// ============================================================================
// Invalidation
// ============================================================================

#[tokio::test]
async fn test_invalidate_missing_entry_is_noop() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());

    assert!(!cache.invalidate(&companies()));

    assert!(cache.entry(&companies()).is_none());
    assert!(cache.is_empty());
    assert_eq!(remote.count(Operation::Fetch), 0);
}

#[tokio::test]
async fn test_invalidate_without_subscribers_defers_refetch() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());

    drop(cache.subscribe(companies()).await);
    assert_eq!(cache.subscriber_count(&companies()), 0);

    assert!(cache.invalidate(&companies()));
    let entry = cache.entry(&companies()).unwrap();
    assert!(entry.stale);
    assert!(!entry.loading);
    assert_eq!(remote.fetch_count(&companies()), 1);

    // The next subscription refetches
    let subscription = cache.subscribe(companies()).await;
    assert!(!subscription.entry().stale);
    assert_eq!(remote.fetch_count(&companies()), 2);
}

#[tokio::test]
async fn test_invalidate_with_subscriber_refetches() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let mut subscription = cache.subscribe(companies()).await;

    remote.seed(ResourceKind::Companies, [json!({"id": "c3", "name": "Initech"})]);
    assert!(cache.invalidate(&companies()));

    let entry = next_settled(&mut subscription).await;
    assert_eq!(
        names(entry.data.as_deref().unwrap()),
        vec!["Acme Corp", "Globex", "Initech"]
    );
    assert_eq!(remote.fetch_count(&companies()), 2);
}

#[tokio::test]
async fn test_invalidate_resource_touches_only_that_resource() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let tickets = QueryKey::all(ResourceKind::Tickets);
    let acme = QueryKey::new(ResourceKind::Companies, Filters::new().with("search", "acme"));

    cache.fetch(companies()).await.unwrap();
    cache.fetch(acme.clone()).await.unwrap();
    cache.fetch(tickets.clone()).await.unwrap();

    assert_eq!(cache.invalidate_resource(ResourceKind::Companies), 2);
    assert!(cache.entry(&companies()).unwrap().stale);
    assert!(cache.entry(&acme).unwrap().stale);
    assert!(!cache.entry(&tickets).unwrap().stale);
}

// ============================================================================
// Stale-response guard
// ============================================================================

#[tokio::test]
async fn test_earlier_response_arriving_late_is_discarded() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let gate_a = remote.hold_next_fetch(&companies());
    let gate_b = remote.hold_next_fetch(&companies());

    let first = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refetch(&companies()).await }
    });
    remote.wait_for_calls(1).await;

    let second = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refetch(&companies()).await }
    });
    remote.wait_for_calls(2).await;

    gate_b.respond(json!([{"id": "b", "name": "From B"}]));
    gate_a.respond(json!([{"id": "a", "name": "From A"}]));

    let after_first = first.await.unwrap();
    let after_second = second.await.unwrap();

    let entry = cache.entry(&companies()).unwrap();
    assert_eq!(names(entry.data.as_deref().unwrap()), vec!["From B"]);
    assert!(!entry.loading);
    assert_eq!(after_first, entry);
    assert_eq!(after_second, entry);
}

#[tokio::test]
async fn test_optimistic_write_supersedes_in_flight_request() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let gate = remote.hold_next_fetch(&companies());

    let pending = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refetch(&companies()).await }
    });
    remote.wait_for_calls(1).await;

    cache.set_data(&companies(), json!([{"id": "c9", "name": "Written"}]));
    gate.respond(json!([{"id": "c1", "name": "Outdated"}]));

    let entry = pending.await.unwrap();
    assert_eq!(names(entry.data.as_deref().unwrap()), vec!["Written"]);
}

#[tokio::test]
async fn test_response_from_before_clear_is_discarded() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let gate_a = remote.hold_next_fetch(&companies());
    let gate_b = remote.hold_next_fetch(&companies());

    let before_logout = tokio::spawn({
        let cache = cache.clone();
        async move { drop(cache.subscribe(companies()).await) }
    });
    remote.wait_for_calls(1).await;

    cache.clear();

    let after_login = tokio::spawn({
        let cache = cache.clone();
        async move { cache.subscribe(companies()).await.entry() }
    });
    remote.wait_for_calls(2).await;

    gate_b.respond(json!([{"id": "new", "name": "B"}]));
    let fresh = after_login.await.unwrap();
    assert_eq!(names(fresh.data.as_deref().unwrap()), vec!["B"]);

    gate_a.respond(json!([{"id": "old", "name": "A"}]));
    before_logout.await.unwrap();

    let entry = cache.entry(&companies()).unwrap();
    assert_eq!(names(entry.data.as_deref().unwrap()), vec!["B"]);
    assert!(!entry.loading);
}

#[tokio::test]
async fn test_response_from_before_remove_is_discarded() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let gate_a = remote.hold_next_fetch(&companies());

    let stale = tokio::spawn({
        let cache = cache.clone();
        async move { drop(cache.subscribe(companies()).await) }
    });
    remote.wait_for_calls(1).await;

    assert!(cache.remove(&companies()));
    cache.set_data(&companies(), json!([{"id": "c9", "name": "Written"}]));

    gate_a.respond(json!([{"id": "old", "name": "A"}]));
    stale.await.unwrap();

    let entry = cache.entry(&companies()).unwrap();
    assert_eq!(names(entry.data.as_deref().unwrap()), vec!["Written"]);
}

// ============================================================================
// Errors and cancellation
// ============================================================================

#[tokio::test]
async fn test_failed_refetch_keeps_previous_data() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let subscription = cache.subscribe(companies()).await;
    let before = subscription.entry().data;

    remote.fail_next(
        Operation::Fetch,
        ClientError::Network {
            status: Some(503),
            message: "Service unavailable".to_string(),
        },
    );
    let entry = cache.refetch(&companies()).await;

    assert_eq!(entry.data, before);
    assert!(entry.error.as_ref().is_some_and(ClientError::is_network));
    assert!(!entry.loading);

    // Served from cache despite the error
    assert!(cache.fetch(companies()).await.is_ok());
}

#[tokio::test]
async fn test_fetch_without_data_reports_error() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    remote.fail_next(
        Operation::Fetch,
        ClientError::from_response(403, r#"{"message":"Forbidden"}"#),
    );

    let result = cache.fetch(companies()).await;

    match result {
        Err(SyncError::Client(error)) => assert!(error.is_auth()),
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_subscriber_still_populates_cache() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote.clone());
    let gate = remote.hold_next_fetch(&companies());
    let token = CancellationToken::new();

    let (result, ()) = tokio::join!(
        cache.subscribe_until_cancelled(companies(), &token),
        async {
            remote.wait_for_calls(1).await;
            token.cancel();
        }
    );
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(cache.subscriber_count(&companies()), 0);

    gate.respond(json!([{"id": "c1", "name": "Acme Corp"}]));
    let subscription = cache.subscribe(companies()).await;

    assert_eq!(
        names(subscription.entry().data.as_deref().unwrap()),
        vec!["Acme Corp"]
    );
    assert_eq!(remote.fetch_count(&companies()), 1);
}

#[tokio::test]
async fn test_removed_entry_closes_subscription() {
    let remote = seeded_remote();
    let cache = QueryCache::new(remote);
    let mut subscription = cache.subscribe(companies()).await;

    assert!(cache.remove(&companies()));

    assert!(matches!(
        subscription.changed().await,
        Err(SyncError::EntryRemoved(_))
    ));
}
