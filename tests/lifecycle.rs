//! Shutdown behavior of a running hub.

use std::time::{Duration, Instant};

use pipehub::lifecycle::{ShutdownReason, ShutdownState};
use pipehub::pipe::CloseFailureReason;
use reqwest::StatusCode;

mod common;
use common::{start_mock_backend, TestHub};

#[tokio::test]
async fn test_async_error_shuts_down_and_closes_every_pipe() {
    let mut hub = TestHub::spawn(
        r#"
        pipe = [
            { "test/tag" = [{ version = "v1", alias = "a" }, { version = "v1", alias = "b" }] },
            { "test/faulty" = [{ version = "v1", alias = "faulty" }] },
        ]
        [server]
        graceful-shutdown = "2s"
        "#,
    )
    .await;

    let report = hub.report().await;
    assert_eq!(
        report.reason,
        ShutdownReason::AsyncError("upstream credentials expired".into())
    );
    assert!(report.close_failures.is_empty());
    assert_eq!(hub.closed(), 3);
    assert_eq!(hub.shutdown.state(), ShutdownState::Closed);
}

fn slow_route(backend: std::net::SocketAddr, server: &str) -> String {
    format!(
        r#"
        pipe = [{{ "test/slow" = [{{ version = "v1", alias = "slow" }}] }}]
        [[host]]
        endpoint = "api.example.com"
        origin = "http://{backend}"
        handler = "slow"
        {server}
        "#
    )
}

#[tokio::test]
async fn test_in_flight_request_drains() {
    let backend = start_mock_backend().await;
    let mut hub = TestHub::spawn(&slow_route(
        backend,
        "[server]\ngraceful-shutdown = \"5s\"",
    ))
    .await;

    let in_flight = hub.get_in_flight("api.example.com", "/slow").await;
    assert!(hub.shutdown.trigger(ShutdownReason::Signal("SIGTERM")));
    assert!(!hub.shutdown.trigger(ShutdownReason::Signal("SIGINT")));

    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "/slow");

    let report = hub.report().await;
    assert_eq!(report.reason, ShutdownReason::Signal("SIGTERM"));
    assert!(report.drained);
    assert_eq!(hub.closed(), 1);
}

#[tokio::test]
async fn test_in_flight_request_drains_without_grace_period() {
    let backend = start_mock_backend().await;
    let mut hub = TestHub::spawn(&slow_route(backend, "")).await;

    let in_flight = hub.get_in_flight("api.example.com", "/slow").await;
    hub.shutdown.trigger(ShutdownReason::Requested);

    // The slow pipe fails the request if it was closed while running.
    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let report = hub.report().await;
    assert!(report.drained);
    assert!(report.close_failures.is_empty());
    assert_eq!(hub.closed(), 1);
}

#[tokio::test]
async fn test_request_past_deadline_is_abandoned_before_close() {
    let backend = start_mock_backend().await;
    let mut hub = TestHub::spawn(&slow_route(
        backend,
        "[server]\ngraceful-shutdown = \"100ms\"",
    ))
    .await;

    let in_flight = hub.get_in_flight("api.example.com", "/slow").await;
    hub.shutdown.trigger(ShutdownReason::Requested);

    let report = hub.report().await;
    assert!(!report.drained);
    assert_eq!(hub.closed(), 1);

    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_close_overrun_is_abandoned_at_deadline() {
    let mut hub = TestHub::spawn(
        r#"
        pipe = [
            { "test/hang-on-close" = [{ version = "v1", alias = "stuck" }] },
            { "test/tag" = [{ version = "v1", alias = "fine" }] },
        ]
        [server]
        graceful-shutdown = "300ms"
        "#,
    )
    .await;

    let started = Instant::now();
    hub.shutdown.trigger(ShutdownReason::Requested);
    let report = hub.report().await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(hub.closed(), 2, "both pipes are asked to close");
    assert_eq!(report.close_failures.len(), 1);
    assert_eq!(report.close_failures[0].alias, "stuck");
    assert_eq!(
        report.close_failures[0].reason,
        CloseFailureReason::DeadlineExceeded
    );
}

#[tokio::test]
async fn test_no_grace_period_closes_idle_hub() {
    let mut hub = TestHub::spawn(
        r#"
        pipe = [{ "test/tag" = [{ version = "v1", alias = "a" }] }]
        "#,
    )
    .await;

    hub.shutdown.trigger(ShutdownReason::Requested);
    let report = hub.report().await;
    assert!(report.close_failures.is_empty());
    assert_eq!(hub.closed(), 1);
}
