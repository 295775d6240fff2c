//! Integration tests for mutation tracking
//!
//! Busy flag, last-call record, client-side validation, cache invalidation
//! and the absence of queueing between concurrent calls.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use eventdesk_client::ClientError;
use eventdesk_client::types::{Company, Ticket};
use eventdesk_core::cancel::CancellationToken;
use eventdesk_core::key::{Filters, QueryKey};
use eventdesk_core::resource::ResourceKind;
use eventdesk_runtime::{MutationKind, MutationOp, MutationTracker, QueryCache, SyncError};
use eventdesk_testing::{InMemoryRemote, Operation, init_tracing};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn remote() -> Arc<InMemoryRemote> {
    init_tracing();
    let remote = Arc::new(InMemoryRemote::new());
    remote.seed(
        ResourceKind::Companies,
        [json!({"id": "c1", "name": "Acme Corp"})],
    );
    remote
}

fn slow_remote() -> Arc<InMemoryRemote> {
    init_tracing();
    Arc::new(InMemoryRemote::new().with_latency(Duration::from_millis(50)))
}

fn company(name: &str) -> Company {
    Company {
        name: name.to_string(),
        ..Company::default()
    }
}

#[tokio::test]
async fn test_create_returns_saved_entity_and_records_outcome() {
    let remote = remote();
    let tracker = MutationTracker::new(remote.clone());

    let saved = tracker.create(&company("Globex")).await.unwrap();

    assert!(saved.id.is_some());
    assert_eq!(saved.name, "Globex");
    assert!(!tracker.busy());

    let last = tracker.last().unwrap();
    assert_eq!(last.kind, MutationKind::Create);
    assert_eq!(last.resource, ResourceKind::Companies);
    assert!(!last.busy);
    assert!(matches!(last.result, Some(Ok(_))));
    assert_eq!(remote.records(ResourceKind::Companies).len(), 2);
}

#[tokio::test]
async fn test_invalid_entity_never_reaches_server() {
    let remote = remote();
    let tracker = MutationTracker::new(remote.clone());

    let invalid = Company {
        email: Some("not-an-email".to_string()),
        ..company("")
    };
    let result = tracker.create(&invalid).await;

    let Err(SyncError::Client(error)) = result else {
        panic!("expected validation error, got {result:?}");
    };
    let fields: Vec<&str> = error.field_errors().iter().map(|f| f.field.as_str()).collect();
    assert_eq!(fields, vec!["name", "email"]);
    assert_eq!(error.status(), None);

    assert_eq!(remote.count(Operation::Create), 0);
    assert!(tracker.last().is_none());
    assert!(!tracker.busy());
}

#[tokio::test]
async fn test_update_of_unsaved_entity_is_rejected_locally() {
    let remote = remote();
    let tracker = MutationTracker::new(remote.clone());

    let result = tracker.update(&company("Acme Corp")).await;

    assert!(result.is_err());
    assert_eq!(remote.count(Operation::Update), 0);
}

#[tokio::test]
async fn test_ticket_validation_checks_price_and_currency() {
    let remote = remote();
    let tracker = MutationTracker::new(remote.clone());

    let ticket = Ticket {
        name: "Early bird".to_string(),
        price_cents: -100,
        currency: "eur".to_string(),
        ..Ticket::default()
    };
    let result = tracker.create(&ticket).await;

    let Err(SyncError::Client(error)) = result else {
        panic!("expected validation error");
    };
    assert_eq!(error.field_errors().len(), 2);
    assert_eq!(remote.count(Operation::Create), 0);
}

#[tokio::test]
async fn test_server_error_is_recorded_and_returned() {
    let remote = remote();
    let tracker = MutationTracker::new(remote.clone());
    remote.fail_next(
        Operation::Create,
        ClientError::from_response(
            422,
            r#"{"message":"The given data was invalid.","errors":{"name":["has already been taken"]}}"#,
        ),
    );

    let result = tracker.create(&company("Acme Corp")).await;

    let error = result.unwrap_err();
    let client_error = error.client_error().unwrap();
    assert_eq!(client_error.status(), Some(422));
    assert_eq!(client_error.field_errors()[0].field, "name");

    let last = tracker.last().unwrap();
    assert_eq!(last.result, Some(Err(client_error.clone())));
    assert!(!tracker.busy());
}

#[tokio::test]
async fn test_busy_while_request_outstanding() {
    let remote = slow_remote();
    let tracker = MutationTracker::new(remote.clone());
    let mut busy = tracker.watch_busy();

    let pending = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.create(&company("Globex")).await }
    });

    busy.wait_for(|busy| *busy).await.unwrap();
    let last = tracker.last().unwrap();
    assert!(last.busy);
    assert!(last.result.is_none());

    pending.await.unwrap().unwrap();
    assert!(!tracker.busy());
    assert!(!tracker.last().unwrap().busy);
}

#[tokio::test]
async fn test_dropped_call_leaves_final_record() {
    let remote = slow_remote();
    let tracker = MutationTracker::new(remote.clone());

    let globex = company("Globex");
    let create = tracker.create(&globex);
    assert!(tokio::time::timeout(Duration::from_millis(10), create).await.is_err());

    assert!(!tracker.busy());
    let last = tracker.last().unwrap();
    assert_eq!(last.kind, MutationKind::Create);
    assert!(!last.busy);
    assert!(last.result.is_none());
}

#[tokio::test]
async fn test_concurrent_calls_are_not_queued() {
    let remote = slow_remote();
    let tracker = MutationTracker::new(remote.clone());

    let first_company = company("First");
    let second_company = company("Second");
    let (first, second, ()) = tokio::join!(
        tracker.create(&first_company),
        tracker.create(&second_company),
        async {
            // Both requests reach the server before either completes
            remote.wait_for_calls(2).await;
            assert!(tracker.busy());
        }
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(!tracker.busy());

    // The record belongs to the call started last
    let last = tracker.last().unwrap();
    let saved = last.result.unwrap().unwrap();
    assert_eq!(saved["name"], "Second");
}

#[tokio::test]
async fn test_success_invalidates_resource_queries() {
    let remote = remote();
    let cache = QueryCache::new(remote.clone());
    let tracker = MutationTracker::new(remote.clone()).with_cache(cache.clone());
    let all = QueryKey::all(ResourceKind::Companies);
    let search = QueryKey::new(ResourceKind::Companies, Filters::new().with("search", "glob"));

    let mut subscription = cache.subscribe(all.clone()).await;
    drop(cache.subscribe(search.clone()).await);

    tracker.create(&company("Globex")).await.unwrap();

    // The subscribed list is refetched in the background
    let entry = loop {
        let entry = subscription.changed().await.unwrap();
        if !entry.loading && !entry.stale {
            break entry;
        }
    };
    assert_eq!(entry.data.unwrap().as_array().unwrap().len(), 2);

    // The unsubscribed one waits for its next reader
    assert!(cache.entry(&search).unwrap().stale);
    assert_eq!(remote.fetch_count(&search), 1);
}

#[tokio::test]
async fn test_failure_leaves_cache_untouched() {
    let remote = remote();
    let cache = QueryCache::new(remote.clone());
    let tracker = MutationTracker::new(remote.clone()).with_cache(cache.clone());
    let all = QueryKey::all(ResourceKind::Companies);
    let _subscription = cache.subscribe(all.clone()).await;

    remote.fail_next(
        Operation::Create,
        ClientError::Network {
            status: None,
            message: "connection reset".to_string(),
        },
    );
    assert!(tracker.create(&company("Globex")).await.is_err());

    assert!(!cache.entry(&all).unwrap().stale);
    assert_eq!(remote.fetch_count(&all), 1);
}

#[tokio::test]
async fn test_update_and_delete_round_trip() {
    let remote = remote();
    let tracker = MutationTracker::new(remote.clone());

    let existing = Company {
        id: Some("c1".to_string()),
        ..company("Acme Inc")
    };
    let updated = tracker.update(&existing).await.unwrap();
    assert_eq!(updated.name, "Acme Inc");
    assert_eq!(remote.records(ResourceKind::Companies)[0]["name"], "Acme Inc");

    tracker.delete(&updated).await.unwrap();
    assert!(remote.records(ResourceKind::Companies).is_empty());
    assert_eq!(tracker.last().unwrap().kind, MutationKind::Delete);

    // Deleting again reaches the server and fails there
    let again = tracker.delete(&updated).await.unwrap_err();
    assert_eq!(again.client_error().unwrap().status(), Some(404));
}

#[tokio::test]
async fn test_cancelled_caller_does_not_abort_request() {
    let remote = slow_remote();
    let tracker = MutationTracker::new(remote.clone());
    let token = CancellationToken::new();
    let op = MutationOp::create(&company("Globex")).unwrap();

    let (result, ()) = tokio::join!(tracker.mutate_until_cancelled(op, &token), async {
        remote.wait_for_calls(1).await;
        token.cancel();
    });
    assert!(matches!(result, Err(SyncError::Cancelled)));

    tracker.watch_busy().wait_for(|busy| !*busy).await.unwrap();
    assert!(matches!(tracker.last().unwrap().result, Some(Ok(_))));
    assert_eq!(remote.records(ResourceKind::Companies).len(), 1);
}

#[tokio::test]
async fn test_reset_clears_record() {
    let remote = remote();
    let tracker = MutationTracker::new(remote);

    tracker.create(&company("Globex")).await.unwrap();
    tracker.reset();

    assert!(tracker.last().is_none());
}
