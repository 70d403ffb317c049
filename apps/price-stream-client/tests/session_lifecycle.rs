//! Session Lifecycle Integration Tests
//!
//! Connection state machine, reconnect backoff, manual disconnect and
//! handling of server-side errors, all on a paused clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::{Instant, sleep};

use common::{ScriptedConnector, directive, price_update, session_config, settle};
use price_stream_client::{ConnectionState, FeedFrame, PriceFeed};

#[tokio::test(start_paused = true)]
async fn first_interest_connects_and_subscribes() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    assert_eq!(status.borrow().state, ConnectionState::Disconnected);

    let _prices = feed.use_desired(["005930", "000660"], true);

    let mut server = servers.recv().await.unwrap();
    assert_eq!(
        server.directive().await.unwrap(),
        directive("subscribe", &["000660", "005930"])
    );

    let connected = status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap()
        .clone();
    assert!(connected.last_connected_at.is_some());
    assert_eq!(connected.reconnect_attempt, 0);
    assert!(connected.last_error.is_none());
    assert_eq!(connector.open_count(), 1);

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_backs_off_exponentially_then_fails() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    let _prices = feed.use_desired(["005930"], true);

    let server = servers.recv().await.unwrap();
    status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();

    connector.refuse();
    server.close(1006, "abnormal closure");
    let lost_at = Instant::now();

    let reconnecting = status
        .wait_for(|s| s.state == ConnectionState::Reconnecting)
        .await
        .unwrap()
        .clone();
    assert_eq!(reconnecting.reconnect_attempt, 1);
    assert_eq!(
        reconnecting.last_error.as_deref(),
        Some("server closed connection (1006): abnormal closure")
    );

    let failed = status
        .wait_for(|s| s.state == ConnectionState::Failed)
        .await
        .unwrap()
        .clone();
    assert_eq!(failed.reconnect_attempt, 5);
    assert_eq!(
        failed.last_error.as_deref(),
        Some("maximum reconnection attempts (5) exceeded")
    );

    // Delays of 1s, 2s, 4s, 8s and 16s, each counted from the previous failure.
    let offsets: Vec<u128> = connector.open_times()[1..]
        .iter()
        .map(|at| at.duration_since(lost_at).as_millis())
        .collect();
    assert_eq!(offsets, vec![1_000, 3_000, 7_000, 15_000, 31_000]);

    sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.open_count(), 6);
    assert_eq!(feed.status().state, ConnectionState::Failed);

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_open_enters_reconnecting() {
    let (connector, _servers) = ScriptedConnector::new();
    connector.refuse();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();

    let _prices = feed.use_desired(["005930"], true);

    let reconnecting = status
        .wait_for(|s| s.state == ConnectionState::Reconnecting)
        .await
        .unwrap()
        .clone();
    assert_eq!(reconnecting.reconnect_attempt, 1);
    assert_eq!(
        reconnecting.last_error.as_deref(),
        Some("connection failed: connection refused")
    );

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn retry_after_failure_starts_a_fresh_budget() {
    let (connector, mut servers) = ScriptedConnector::new();
    connector.refuse();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    let _prices = feed.use_desired(["005930"], true);

    status
        .wait_for(|s| s.state == ConnectionState::Failed)
        .await
        .unwrap();

    connector.accept();
    feed.retry();

    let mut server = servers.recv().await.unwrap();
    assert_eq!(
        server.directive().await.unwrap(),
        directive("subscribe", &["005930"])
    );
    let connected = status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap()
        .clone();
    assert_eq!(connected.reconnect_attempt, 0);
    assert!(connected.last_error.is_none());

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_reconnecting_cancels_the_timer() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    let _prices = feed.use_desired(["005930"], true);

    let server = servers.recv().await.unwrap();
    status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();

    connector.refuse();
    drop(server);
    status
        .wait_for(|s| s.state == ConnectionState::Reconnecting)
        .await
        .unwrap();

    feed.disconnect("user request");
    let disconnected = status
        .wait_for(|s| s.state == ConnectionState::Disconnected)
        .await
        .unwrap()
        .clone();
    assert_eq!(disconnected.reconnect_attempt, 0);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.open_count(), 1);
    assert_eq!(feed.status().state, ConnectionState::Disconnected);

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_sends_normal_close_and_stays_down() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    let mut prices = feed.use_desired(["005930"], true);

    let mut server = servers.recv().await.unwrap();
    server.directive().await.unwrap();

    feed.disconnect("user request");
    status
        .wait_for(|s| s.state == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert_eq!(
        server.drain(),
        vec![FeedFrame::Close {
            code: 1000,
            reason: "user request".into()
        }]
    );

    // New interest does not reopen a deliberately closed connection.
    prices.set_symbols(["005930", "000660"]);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_count(), 1);

    feed.connect();
    let mut server = servers.recv().await.unwrap();
    assert_eq!(
        server.directive().await.unwrap(),
        directive("subscribe", &["000660", "005930"])
    );

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_normal_close_still_reconnects() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    let _prices = feed.use_desired(["005930"], true);

    let server = servers.recv().await.unwrap();
    status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();

    server.close(1000, "server restart");
    status
        .wait_for(|s| s.state == ConnectionState::Reconnecting)
        .await
        .unwrap();

    let _server = servers.recv().await.unwrap();
    status
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(connector.open_count(), 2);

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_error_is_surfaced_without_closing() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut status = feed.status_receiver();
    let _prices = feed.use_desired(["005930"], true);

    let server = servers.recv().await.unwrap();
    server.send(&json!({ "type": "error", "message": "rate limited" }));

    let status = status
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap()
        .clone();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.last_error.as_deref(), Some("rate limited"));
    assert_eq!(connector.open_count(), 1);

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_payloads_are_dropped() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector.clone());
    let mut snapshots = feed.snapshot_receiver();
    let _prices = feed.use_desired(["005930"], true);

    let server = servers.recv().await.unwrap();
    server.send_text("not json");
    server.send_text("[1, 2, 3]");
    server.send(&json!({ "type": "mystery" }));
    server.send(&json!({ "type": "price_update", "data": { "stock_code": "005930" } }));
    server.send(&price_update("005930", 71_000));

    snapshots.changed().await.unwrap();
    let snapshot = snapshots.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("005930").unwrap().price, Decimal::from(71_000));

    let status = feed.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert!(status.last_error.is_none());

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connection_status_reports_acknowledged_symbols() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector);
    let mut status = feed.status_receiver();
    let _prices = feed.use_desired(["005930", "000660"], true);

    let server = servers.recv().await.unwrap();
    server.send(&json!({
        "type": "connection_status",
        "subscribed_codes": ["005930", "000660"]
    }));

    status
        .wait_for(|s| s.acknowledged_symbols == 2)
        .await
        .unwrap();

    feed.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_connection() {
    let (connector, mut servers) = ScriptedConnector::new();
    let feed = PriceFeed::spawn(session_config(), connector);
    let _prices = feed.use_desired(["005930"], true);

    let mut server = servers.recv().await.unwrap();
    server.directive().await.unwrap();
    settle().await;

    feed.shutdown().await;

    assert_eq!(
        server.drain(),
        vec![FeedFrame::Close {
            code: 1000,
            reason: "session shutdown".into()
        }]
    );
    assert_eq!(feed.status().state, ConnectionState::Disconnected);
}
