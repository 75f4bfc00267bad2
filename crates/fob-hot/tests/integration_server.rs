//! Integration tests for the HTTP surface.
//!
//! A scripted compiler drives a real coordinator; requests go through the
//! axum router without binding a socket.

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::{Router, routing};
use fob_hot::artifact::content_hash;
use fob_hot::{BuildState, HoldPolicy, HotBridge, HotConfig, HotMessage};
use helpers::*;
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;
use tower::ServiceExt;

const INDEX: &str = "<html><body><h1>App</h1></body></html>";

#[tokio::test]
async fn test_serves_first_generation() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("index.html", INDEX), ("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;

    let response = hot.router().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("application/javascript"));
    assert_eq!(header(&response, "x-fob-generation"), Some("1"));
    assert_eq!(header(&response, "cache-control"), Some("no-cache"));
    let etag = format!("\"{}\"", content_hash(b"v1"));
    assert_eq!(header(&response, "etag"), Some(etag.as_str()));
    assert_eq!(body_string(response).await, "v1");

    handle.stop().await;
}

#[tokio::test]
async fn test_root_serves_entry_with_client_script() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("index.html", INDEX)]).await;
    wait_for(&hot, BuildState::Valid, 1).await;

    let response = hot.router().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("<h1>App</h1>"));
    assert!(html.contains(r#"<script src="/__fob_hot__/client.js"></script>"#));

    let script_response = hot.router().oneshot(get("/__fob_hot__/client.js")).await.unwrap();
    assert_eq!(script_response.status(), StatusCode::OK);
    assert_eq!(
        header(&script_response, "content-type"),
        Some("application/javascript")
    );
    assert!(body_string(script_response).await.contains("EventSource"));

    handle.stop().await;
}

#[tokio::test]
async fn test_client_injection_can_be_disabled() {
    let hot = HotBridge::new(HotConfig {
        inject_client: false,
        ..HotConfig::default()
    });
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("index.html", INDEX)]).await;
    wait_for(&hot, BuildState::Valid, 1).await;

    let response = hot.router().oneshot(get("/index.html")).await.unwrap();
    assert_eq!(body_string(response).await, INDEX);

    handle.stop().await;
}

#[tokio::test]
async fn test_conditional_and_head_requests() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;

    let etag = format!("\"{}\"", content_hash(b"v1"));
    let request = Request::builder()
        .uri("/main.js")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = hot.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&response, "etag"), Some(etag.as_str()));
    assert!(body_string(response).await.is_empty());

    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/main.js")
        .body(Body::empty())
        .unwrap();
    let response = hot.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-length"), Some("2"));
    assert!(body_string(response).await.is_empty());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/main.js")
        .body(Body::empty())
        .unwrap();
    let response = hot.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    handle.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;

    let response = hot.router().oneshot(get("/missing.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_string(response).await.contains("/missing.js"));

    handle.stop().await;
}

#[tokio::test]
async fn test_failed_build_reaches_http_and_streaming_clients() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();
    let mut client = hot.bridge().subscribe();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;
    script.begin().await;
    script.fail("Module not found: './x'").await;
    wait_for(&hot, BuildState::Invalid, 2).await;

    let response = hot.router().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header(&response, "content-type"), Some("application/json"));
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["generation"], 2);
    assert_eq!(json["diagnostics"][0], "Module not found: './x'");

    let request = Request::builder()
        .uri("/main.js")
        .header(header::ACCEPT, "text/html,application/xhtml+xml")
        .body(Body::empty())
        .unwrap();
    let response = hot.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = body_string(response).await;
    assert!(html.contains("Module not found: &#x27;./x&#x27;"));

    let first: HotMessage = serde_json::from_str(&client.recv().await.unwrap()).unwrap();
    assert_eq!(first.generation(), 1);
    let second: HotMessage = serde_json::from_str(&client.recv().await.unwrap()).unwrap();
    assert_eq!(
        second,
        HotMessage::Failed {
            generation: 2,
            diagnostics: vec!["Module not found: './x'".to_string()],
        }
    );

    // Recovery replaces the error with fresh output
    script.begin().await;
    script.succeed(&[("main.js", "v3")]).await;
    wait_for(&hot, BuildState::Valid, 3).await;
    let response = hot.router().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(body_string(response).await, "v3");

    handle.stop().await;
}

#[tokio::test]
async fn test_held_request_gets_the_new_generation() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;
    script.begin().await;
    wait_for(&hot, BuildState::Compiling, 2).await;

    let router = hot.router();
    let held = tokio::spawn(async move { router.oneshot(get("/main.js")).await.unwrap() });
    wait_until(|| hot.state().pending_count() == 1).await;

    script.succeed(&[("main.js", "v2")]).await;

    let response = held.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-fob-generation"), Some("2"));
    assert_eq!(body_string(response).await, "v2");

    handle.stop().await;
}

#[tokio::test]
async fn test_request_before_first_build_is_held() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    let router = hot.router();
    let held = tokio::spawn(async move { router.oneshot(get("/main.js")).await.unwrap() });
    wait_until(|| hot.state().pending_count() == 1).await;

    script.succeed(&[("main.js", "v1")]).await;

    let response = held.await.unwrap();
    assert_eq!(header(&response, "x-fob-generation"), Some("1"));
    assert_eq!(body_string(response).await, "v1");

    handle.stop().await;
}

#[tokio::test]
async fn test_stale_policy_serves_previous_generation() {
    let hot = HotBridge::new(HotConfig {
        hold_policy: HoldPolicy::Stale,
        ..HotConfig::default()
    });
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;
    script.begin().await;
    wait_for(&hot, BuildState::Compiling, 2).await;

    let response = hot.router().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(header(&response, "x-fob-generation"), Some("1"));
    assert_eq!(body_string(response).await, "v1");
    assert_eq!(hot.state().pending_count(), 0);

    handle.stop().await;
}

#[tokio::test]
async fn test_held_request_times_out() {
    let hot = HotBridge::new(HotConfig {
        request_timeout_ms: 50,
        ..HotConfig::default()
    });
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;
    script.begin().await;
    wait_for(&hot, BuildState::Compiling, 2).await;

    let started = Instant::now();
    let response = hot.router().oneshot(get("/main.js")).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(elapsed >= Duration::from_millis(50));
    assert!(body_string(response).await.contains("/main.js"));
    assert_eq!(hot.state().pending_count(), 0);

    // The build still completes normally afterwards
    script.succeed(&[("main.js", "v2")]).await;
    wait_for(&hot, BuildState::Valid, 2).await;

    handle.stop().await;
}

#[tokio::test]
async fn test_stop_releases_held_requests() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    let router = hot.router();
    let held = tokio::spawn(async move { router.oneshot(get("/main.js")).await.unwrap() });
    wait_until(|| hot.state().pending_count() == 1).await;

    handle.stop().await;
    assert!(!handle.is_running());
    assert_eq!(script.closes(), 1);

    let response = held.await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Second stop is a no-op
    handle.stop().await;
    assert_eq!(script.closes(), 1);
}

#[tokio::test]
async fn test_compiler_start_failure() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = broken();

    let err = hot.start(compiler).await.unwrap_err();
    assert!(matches!(err, fob_hot::HotError::CompilerStart(_)));
    assert!(err.to_string().contains("./src/index.ts"));
    assert_eq!(hot.state().status().state, BuildState::Idle);
    assert_eq!(script.closes(), 1);
}

#[tokio::test]
async fn test_register_falls_through_to_app_routes() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;

    let app = hot.register(Router::new().route("/api/health", routing::get(|| async { "healthy" })));

    let response = app.clone().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "healthy");

    let response = app.clone().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(body_string(response).await, "v1");

    let response = app.clone().oneshot(get("/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/__fob_hot__/client.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    handle.stop().await;
}

#[tokio::test]
async fn test_register_keeps_app_routes_during_failed_build() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    script.succeed(&[("index.html", INDEX), ("main.js", "v1")]).await;
    wait_for(&hot, BuildState::Valid, 1).await;
    script.begin().await;
    script.fail("Module not found: './x'").await;
    wait_for(&hot, BuildState::Invalid, 2).await;

    let app = hot.register(Router::new().route("/api/health", routing::get(|| async { "healthy" })));

    let response = app.clone().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "healthy");

    let response = app.clone().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("Module not found"));

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    handle.stop().await;
}

#[tokio::test]
async fn test_request_after_stop_is_unavailable_immediately() {
    let config = HotConfig {
        request_timeout_ms: 5_000,
        ..HotConfig::default()
    };
    let hot = HotBridge::new(config);
    let (compiler, _script) = scripted();
    let handle = hot.start(compiler).await.unwrap();
    handle.stop().await;
    assert!(hot.state().is_stopped());

    let started = Instant::now();
    let response = hot.router().oneshot(get("/main.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(hot.state().pending_count(), 0);

    // App routes are not affected
    let app = hot.register(Router::new().route("/api/health", routing::get(|| async { "healthy" })));
    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_event_stream_delivers_build_messages() {
    let hot = HotBridge::new(HotConfig::default());
    let (compiler, script) = scripted();
    let handle = hot.start(compiler).await.unwrap();

    let response = hot.router().oneshot(get("/__fob_hot__")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("text/event-stream"));
    wait_until(|| hot.bridge().client_count() == 1).await;

    script.succeed(&[("main.js", "v1")]).await;

    let mut stream = response.into_body().into_data_stream();
    let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.starts_with("data: {\"type\":\"ok\",\"generation\":1"), "{}", frame);

    // Disconnected clients are dropped at the next delivery
    drop(stream);
    script.begin().await;
    script.succeed(&[("main.js", "v2")]).await;
    wait_until(|| hot.bridge().client_count() == 0).await;
    assert_eq!(hot.state().status().generation, 2);

    handle.stop().await;
}
