//! axum integration.
//!
//! [`HotBridge`] bundles shared state, the request gate and the update
//! bridge. It either plugs into an existing app with
//! [`register`](HotBridge::register) or serves on its own with
//! [`router`](HotBridge::router).
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use fob_hot::{DirectoryCompiler, DirectoryOptions, HotBridge, HotConfig};
//!
//! # async fn run() -> fob_hot::Result<()> {
//! let hot = HotBridge::new(HotConfig::default());
//! let handle = hot
//!     .start(DirectoryCompiler::new("dist", DirectoryOptions::default()))
//!     .await?;
//!
//! let app = hot.register(Router::new().route("/api/health", get(|| async { "ok" })));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//!
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::artifact::Artifact;
use crate::bridge::UpdateBridge;
use crate::build::Diagnostics;
use crate::compiler::Compiler;
use crate::config::HotConfig;
use crate::coordinator::{BuildCoordinator, WatchHandle};
use crate::error::{HotError, Result};
use crate::gate::{GateResponse, RequestGate};
use crate::message::HotMessage;
use crate::overlay;
use crate::state::{HotState, SharedState};
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};

/// Generation of the artifact set a response was served from.
pub const GENERATION_HEADER: &str = "x-fob-generation";

const CLIENT_SCRIPT: &str = include_str!("../assets/hot-client.js");

/// Hot-update bridge for an axum app.
#[derive(Debug, Clone)]
pub struct HotBridge {
    state: SharedState,
    gate: RequestGate,
    bridge: UpdateBridge,
    config: Arc<HotConfig>,
}

impl HotBridge {
    /// Create a bridge with fresh state.
    pub fn new(config: HotConfig) -> Self {
        let state = Arc::new(HotState::new());
        let gate = RequestGate::new(Arc::clone(&state), &config);
        let bridge = UpdateBridge::new(config.client_buffer);

        Self {
            state,
            gate,
            bridge,
            config: Arc::new(config),
        }
    }

    /// Put `compiler` into watch mode and drive this bridge from it.
    ///
    /// # Errors
    ///
    /// Returns `HotError::CompilerStart` if the compiler cannot start.
    pub async fn start<C: Compiler>(&self, compiler: C) -> Result<WatchHandle> {
        BuildCoordinator::new(Arc::clone(&self.state), self.bridge.clone())
            .with_build_announcements(self.config.announce_builds)
            .start(compiler)
            .await
    }

    /// Active configuration.
    pub fn config(&self) -> &HotConfig {
        &self.config
    }

    /// Shared build state.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Streaming client registry.
    pub fn bridge(&self) -> &UpdateBridge {
        &self.bridge
    }

    /// Request gate.
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Install the event stream, client script and gate middleware on `app`.
    ///
    /// GET and HEAD requests go through the gate first. Paths the current
    /// generation does not have fall through to `app`, and build failures
    /// only replace responses for paths the gate owns.
    pub fn register<S>(&self, app: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        app.route(
            self.config.events_path(),
            get(handle_events).with_state(self.clone()),
        )
        .route(&self.config.client_script_path(), get(handle_client_script))
        .layer(middleware::from_fn_with_state(self.clone(), gate_middleware))
    }

    /// Standalone router serving only build output.
    pub fn router(&self) -> Router {
        Router::new()
            .route(self.config.events_path(), get(handle_events))
            .route(&self.config.client_script_path(), get(handle_client_script))
            .fallback(handle_gate)
            .with_state(self.clone())
    }

    fn is_own_path(&self, path: &str) -> bool {
        let prefix = self.config.events_path();
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Turn a gate decision into an HTTP response.
    fn respond(&self, outcome: Result<GateResponse>, headers: &HeaderMap, head: bool) -> Response {
        let response = match outcome {
            Ok(GateResponse::Artifact {
                generation,
                artifact,
            }) => self.artifact_response(generation, &artifact, headers),
            Ok(GateResponse::NotFound { path }) => {
                text_response(StatusCode::NOT_FOUND, format!("File not found: {}", path))
            }
            Ok(GateResponse::BuildFailed { diagnostics }) => {
                self.failure_response(&diagnostics, headers)
            }
            Err(err @ HotError::RequestTimeout { .. }) => {
                text_response(StatusCode::GATEWAY_TIMEOUT, err.to_string())
            }
            Err(err @ HotError::WatchStopped { .. }) => {
                text_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        if head {
            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Body::empty())
        } else {
            response
        }
    }

    fn artifact_response(
        &self,
        generation: u64,
        artifact: &Artifact,
        headers: &HeaderMap,
    ) -> Response {
        let etag = format!("\"{}\"", artifact.hash);

        let not_modified = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| etag_matches(value, &artifact.hash));

        let mut response = if not_modified {
            StatusCode::NOT_MODIFIED.into_response()
        } else {
            let body = if self.config.inject_client && artifact.is_html() {
                overlay::inject_client_script(&artifact.content, &self.config.client_script_path())
            } else {
                artifact.content.clone()
            };

            let content_length = body.len();
            let mut response = Body::from(body).into_response();
            let response_headers = response.headers_mut();
            response_headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(artifact.content_type),
            );
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
            response
        };

        let response_headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&etag) {
            response_headers.insert(header::ETAG, value);
        }
        response_headers.insert(GENERATION_HEADER, HeaderValue::from(generation));
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }

    fn failure_response(&self, diagnostics: &Diagnostics, headers: &HeaderMap) -> Response {
        let wants_html = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/html"));

        let (content_type, body) = if wants_html {
            (
                "text/html; charset=utf-8",
                overlay::error_overlay(diagnostics, self.config.events_path()),
            )
        } else {
            let message = HotMessage::Failed {
                generation: diagnostics.generation,
                diagnostics: diagnostics.messages.clone(),
            };
            ("application/json", message.to_json())
        };

        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        let response_headers = response.headers_mut();
        response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response_headers.insert(GENERATION_HEADER, HeaderValue::from(diagnostics.generation));
        response
    }
}

/// Whether an `If-None-Match` header value matches a content hash.
fn etag_matches(if_none_match: &str, hash: &str) -> bool {
    if_none_match.split(',').any(|tag| {
        let tag = tag.trim();
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        tag == "*" || tag.trim_matches('"') == hash
    })
}

fn text_response(status: StatusCode, body: String) -> Response {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn gate_middleware(State(hot): State<HotBridge>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    if !(method == Method::GET || method == Method::HEAD) || hot.is_own_path(request.uri().path()) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let outcome = hot.gate.handle(&path).await;
    let falls_through = match &outcome {
        Ok(GateResponse::Artifact { .. }) => false,
        Ok(GateResponse::NotFound { .. }) => true,
        // Failures only answer for build output; other paths belong to the app
        _ => !hot.gate.owns(&path),
    };

    if falls_through {
        next.run(request).await
    } else {
        hot.respond(outcome, request.headers(), method == Method::HEAD)
    }
}

async fn handle_gate(
    State(hot): State<HotBridge>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if !(method == Method::GET || method == Method::HEAD) {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let outcome = hot.gate.handle(uri.path()).await;
    hot.respond(outcome, &headers, method == Method::HEAD)
}

/// Handle event stream connections.
async fn handle_events(
    State(hot): State<HotBridge>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let client = hot.bridge.subscribe();
    tracing::info!("Client {} connected", client.id());

    let stream = client
        .into_stream()
        .map(|json| Ok(Event::default().data(&*json)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(hot.config.keep_alive_secs))
            .text("ping"),
    )
}

async fn handle_client_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}
