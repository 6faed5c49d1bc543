mod common;

use common::FakeQuery;
use std::time::Duration;
use strikewatch_backend::error::StatusError;
use strikewatch_backend::query::{QueryOptions, QueryService};
use tokio::time::{Instant, advance};

fn options(retries: u32) -> QueryOptions {
    QueryOptions {
        timeout: Duration::from_millis(5000),
        cache_ttl: Duration::from_millis(5000),
        retries,
        batch_timeout: Duration::from_millis(15_000),
    }
}

// =============================================================================
// CACHE TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_repeat_query_within_ttl_served_from_cache() {
    // GIVEN: A service with a 5 second cache
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(0));

    // WHEN: Querying the same server twice, 4.9 seconds apart
    let first = service.query_str("10.0.0.1:27015").await.unwrap();
    advance(Duration::from_millis(4900)).await;
    let second = service.query_str("10.0.0.1:27015").await.unwrap();

    // THEN: The backend was contacted once and both results match
    assert_eq!(backend.call_count(), 1);
    assert_eq!(first, second);
    assert_eq!(service.cache_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_query_after_ttl_contacts_server_again() {
    // GIVEN: A cached result
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(0));
    service.query_str("10.0.0.1").await.unwrap();

    // WHEN: The TTL has passed
    advance(Duration::from_millis(5001)).await;
    service.query_str("10.0.0.1").await.unwrap();

    // THEN: A fresh query was made
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_equivalent_addresses_share_cache_entry() {
    // GIVEN: A service
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(0));

    // WHEN: Querying with and without the default port
    service.query_str("10.0.0.1").await.unwrap();
    service.query_str("udp://10.0.0.1:27015").await.unwrap();

    // THEN: Only one backend call was needed
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ttl_disables_cache() {
    // GIVEN: Caching turned off
    let backend = FakeQuery::healthy();
    let mut opts = options(0);
    opts.cache_ttl = Duration::ZERO;
    let service = QueryService::new(backend.clone(), opts);

    // WHEN: Querying twice
    service.query_str("10.0.0.1").await.unwrap();
    service.query_str("10.0.0.1").await.unwrap();

    // THEN: Both went to the backend and nothing was stored
    assert_eq!(backend.call_count(), 2);
    assert_eq!(service.cache_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_forces_fresh_query() {
    // GIVEN: Two cached results
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(0));
    service.query_str("10.0.0.1").await.unwrap();
    service.query_str("10.0.0.2").await.unwrap();

    // WHEN: Clearing the cache
    let removed = service.clear_cache().await;
    service.query_str("10.0.0.1").await.unwrap();

    // THEN: Both entries were dropped and the next query hit the backend
    assert_eq!(removed, 2);
    assert_eq!(backend.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_not_cached() {
    // GIVEN: A server that fails once
    let backend = FakeQuery::failing_first(1);
    let service = QueryService::new(backend.clone(), options(0));

    // WHEN: Querying twice
    let first = service.query_str("10.0.0.1").await;
    let second = service.query_str("10.0.0.1").await;

    // THEN: The failure did not stick
    assert!(first.is_err());
    assert!(second.is_ok());
    assert_eq!(backend.call_count(), 2);
}

// =============================================================================
// RETRY TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_third_attempt() {
    // GIVEN: Two retries and a server that fails twice
    let backend = FakeQuery::failing_first(2);
    let service = QueryService::new(backend.clone(), options(2));

    // WHEN: Querying
    let started = Instant::now();
    let result = service.query_str("10.0.0.1").await;

    // THEN: The third attempt succeeded after two one second pauses
    assert!(result.is_ok());
    assert_eq!(backend.call_count(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_report_last_error() {
    // GIVEN: A server that never answers
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(1));

    // WHEN: Querying
    let result = service.query_str("down.example.com").await;

    // THEN: Both attempts were made and the error names the address
    assert_eq!(backend.call_count(), 2);
    match result {
        Err(StatusError::QueryFailed {
            address,
            attempts,
            message,
        }) => {
            assert_eq!(address, "down.example.com:27015");
            assert_eq!(attempts, 2);
            assert_eq!(message, "connection refused");
        }
        other => panic!("expected QueryFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_counts_as_failure() {
    // GIVEN: A server slower than the per-attempt timeout
    let backend = FakeQuery::healthy().with_latency(Duration::from_secs(10));
    let service = QueryService::new(backend.clone(), options(0));

    // WHEN: Querying
    let started = Instant::now();
    let result = service.query_str("10.0.0.1").await;

    // THEN: The attempt was abandoned at the timeout
    assert_eq!(started.elapsed(), Duration::from_millis(5000));
    let err = result.unwrap_err();
    assert!(err.to_string().contains("no response within 5000ms"));
}

#[tokio::test]
async fn test_invalid_address_never_reaches_backend() {
    // GIVEN: A service
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(3));

    // WHEN: Querying a malformed address
    let result = service.query_str("1.2.3.4:99999").await;

    // THEN: It is rejected up front
    assert!(matches!(result, Err(StatusError::InvalidAddress { .. })));
    assert_eq!(backend.call_count(), 0);
}

// =============================================================================
// BATCH TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_batch_keeps_input_order_with_failures() {
    // GIVEN: Three addresses with a malformed one in the middle
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(0));
    let addresses = vec![
        "10.0.0.1:27015".to_string(),
        "a:b:c".to_string(),
        "down.example.com".to_string(),
        "10.0.0.2:27016".to_string(),
    ];

    // WHEN: Querying the batch
    let report = service.query_batch(&addresses).await;

    // THEN: Every address has an entry, numbered in input order
    assert_eq!(report.entries.len(), 4);
    let indices: Vec<_> = report.entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert_eq!(report.entries[0].outcome.as_ref().unwrap().port, 27015);
    assert!(matches!(
        report.entries[1].outcome,
        Err(StatusError::InvalidAddress { .. })
    ));
    assert!(matches!(
        report.entries[2].outcome,
        Err(StatusError::QueryFailed { .. })
    ));
    assert_eq!(report.entries[3].outcome.as_ref().unwrap().port, 27016);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_runs_members_concurrently() {
    // GIVEN: Three servers that each take one second to answer
    let backend = FakeQuery::healthy().with_latency(Duration::from_secs(1));
    let service = QueryService::new(backend.clone(), options(0));
    let addresses: Vec<String> = (1..=3).map(|i| format!("10.0.0.{}", i)).collect();

    // WHEN: Querying the batch
    let report = service.query_batch(&addresses).await;

    // THEN: The whole batch took as long as one query
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.elapsed, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_batch_deadline_marks_slow_members_failed() {
    // GIVEN: A batch deadline shorter than the server latency
    let backend = FakeQuery::healthy().with_latency(Duration::from_secs(10));
    let mut opts = options(0);
    opts.timeout = Duration::from_secs(30);
    opts.batch_timeout = Duration::from_secs(2);
    let service = QueryService::new(backend, opts);

    // WHEN: Querying the batch
    let report = service.query_batch(&["10.0.0.1".to_string()]).await;

    // THEN: The member failed at the deadline
    assert_eq!(report.elapsed, Duration::from_secs(2));
    let err = report.entries[0].outcome.as_ref().unwrap_err();
    assert!(err.to_string().contains("batch deadline of 2000ms exceeded"));
}

#[tokio::test]
async fn test_empty_batch_is_empty_report() {
    // GIVEN: A service
    let backend = FakeQuery::healthy();
    let service = QueryService::new(backend.clone(), options(0));

    // WHEN: Querying no addresses
    let report = service.query_batch(&[]).await;

    // THEN: Nothing happened
    assert!(report.is_empty());
    assert_eq!(report.elapsed, Duration::ZERO);
    assert_eq!(backend.call_count(), 0);
}
