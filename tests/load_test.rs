//! Concurrency tests for the ChatAds client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use chatads_client::pool::TransportError;
use chatads_client::{CircuitState, MessageRequest, ResultStatus};

mod common;
use common::{Reply, ScriptedTransport, MESSAGE};

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_single_trial() {
    let mut config = common::test_config();
    config.retries.max_attempts = 1;
    config.circuit_breaker.failure_threshold = 1;
    let transport = ScriptedTransport::new(
        vec![Reply::Fail(TransportError::Connect("refused".into()))],
        Reply::Slow(Duration::from_secs(2), 200, common::match_body().to_string()),
    );
    let (client, _) = common::scripted_client(config, transport.clone());

    client.send_message(MessageRequest::new(MESSAGE)).await;
    assert_eq!(client.breaker_state(), Some(CircuitState::Open));

    tokio::time::advance(Duration::from_secs(61)).await;

    let calls = (0..10).map(|_| client.send_message(MessageRequest::new(MESSAGE)));
    let results = join_all(calls).await;

    let succeeded = results.iter().filter(|r| r.status == ResultStatus::Success).count();
    let blocked = results
        .iter()
        .filter(|r| r.error_code.as_deref() == Some("BREAKER_OPEN"))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(blocked, 9);
    assert!(results
        .iter()
        .filter(|r| r.status == ResultStatus::Error)
        .all(|r| r.metadata.attempts == 0));
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.breaker_state(), Some(CircuitState::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_cache_stays_bounded_across_credentials() {
    let mut config = common::test_config();
    config.cache.max_entries = 3;
    let transport = ScriptedTransport::repeating(Reply::json(200, common::match_body()));
    let (client, factory) = common::scripted_client(config, transport);

    let calls = (0..20).map(|i| {
        client.send_message(MessageRequest::new(MESSAGE).with_credential(format!("sk_test_tenant_{i:04}")))
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.status == ResultStatus::Success));
    assert_eq!(factory.builds(), 20);
    assert_eq!(client.cached_transports(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_share_one_transport_per_credential() {
    let mut config = common::test_config();
    config.cache.max_entries = 5;
    let transport = ScriptedTransport::repeating(Reply::json(200, common::no_match_body()));
    let (client, factory) = common::scripted_client(config, transport.clone());
    let client = Arc::new(client);

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let request = MessageRequest::new(MESSAGE).with_credential(format!("sk_test_shared_{:02}", i % 5));
                client.send_message(request).await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.status, ResultStatus::NoMatch);
        assert_eq!(result.reason.as_deref(), Some("No match: insufficient data"));
    }

    assert_eq!(factory.builds(), 5);
    assert_eq!(transport.calls(), 50);
    assert_eq!(client.cached_transports(), 5);
    assert_eq!(client.breaker_state(), Some(CircuitState::Closed));
}
