//! Serve command.
//!
//! 1. Resolve configuration (defaults, fob-hot.json, env, flags)
//! 2. Put the directory compiler into watch mode
//! 3. Serve build output with live reload until Ctrl+C
//! 4. Stop watch mode and close client streams

use crate::cli::ServeArgs;
use crate::ui;
use axum::Router;
use fob_hot::{DirectoryCompiler, HotBridge, HotError, Result, WatchHandle};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Execute the serve command.
///
/// # Errors
///
/// Returns errors for invalid configuration, a root that cannot be watched
/// or an address that cannot be bound.
pub async fn execute(args: ServeArgs) -> Result<()> {
    ui::info("Starting fob-hot...");

    let config = args.resolve_config()?;
    tracing::debug!("Resolved configuration: {:?}", config);
    let hot = HotBridge::new(config);

    let compiler = DirectoryCompiler::new(&args.root, args.directory_options());
    ui::info(&format!("Watching {}", compiler.root().display()));
    let handle = Arc::new(hot.start(compiler).await?);

    let addr = args.addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            handle.stop().await;
            return Err(HotError::Server(format!("Failed to bind to {}: {}", addr, e)));
        }
    };

    ui::success(&format!("Server running at http://{}", addr));
    ui::info(&format!(
        "Hold policy: {:?}, live reload at {}",
        hot.gate().policy(),
        hot.config().events_path()
    ));
    ui::info("Press Ctrl+C to stop");

    let served = axum::serve(listener, build_app(&hot))
        .with_graceful_shutdown(shutdown_signal(hot.clone(), Arc::clone(&handle)))
        .await;

    // Already stopped on Ctrl+C; needed when the server failed on its own
    handle.stop().await;
    served.map_err(|e| HotError::Server(format!("Server error: {}", e)))?;

    ui::success("Server stopped");
    Ok(())
}

/// App served by the command: the bridge registered on an empty router,
/// plus permissive CORS.
pub fn build_app(hot: &HotBridge) -> Router {
    hot.register(Router::new()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Resolve on Ctrl+C after stopping watch mode and ending event streams.
async fn shutdown_signal(hot: HotBridge, handle: Arc<WatchHandle>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        ui::error(&format!("Failed to listen for Ctrl+C: {}", e));
        std::future::pending::<()>().await;
    }

    ui::info("Shutting down...");
    handle.stop().await;
    let disconnected = hot.bridge().disconnect_all();
    tracing::debug!("Closed {} event streams", disconnected);
}
