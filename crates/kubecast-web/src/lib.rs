//! Kubecast Web Server
//!
//! Axum server exposing the resource websocket, the internal notify hook
//! and a health endpoint.

pub mod routes;
pub mod state;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use kubecast_core::RelayConfig;
use kubecast_hub::Hub;

use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_path = state.config.websocket.path.clone();

    Router::new()
        .route(&ws_path, get(websocket::ws_handler))
        .route("/internal/notify", post(routes::internal::notify))
        .route("/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Once the signal fires the hub is shut down, which closes every open
/// websocket. axum stops tracking a connection once it upgrades, so the
/// websocket adapters are awaited separately, for at most twice the write
/// deadline.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = Arc::clone(&state.hub);
    let connections = state.connections.clone();
    let drain_limit = state.config.websocket.write_timeout() * 2;
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = hub.shutdown();
            tracing::info!(closed, "Shutting down, closed all subscribers");
        })
        .await?;

    connections.close();
    let pending = connections.len();
    if pending > 0 {
        tracing::debug!(pending, "Waiting for websocket connections to drain");
    }
    if tokio::time::timeout(drain_limit, connections.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            pending = connections.len(),
            limit_secs = drain_limit.as_secs(),
            "Websocket connections still open at shutdown"
        );
    }
    Ok(())
}

/// Run the web server until Ctrl-C.
pub async fn run_server(config: RelayConfig, hub: Arc<Hub>) -> anyhow::Result<()> {
    let addr = config.server.bind_addr();
    let ws_path = config.websocket.path.clone();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Relay listening on http://{}", addr);
    tracing::info!("Resource websocket at ws://{}{}", addr, ws_path);

    let state = AppState::new(hub, config);
    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await
}
