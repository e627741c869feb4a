//! HTTP server: the node's wire surface.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, info};

use astral_dht::engine::{DhtEngine, Transport};
use astral_dht::messages::{DhtMessage, ErrorBody};
use astral_dht::storage::Storage;
use astral_dht::DhtError;

/// Build the wire router for an engine.
pub fn router<T, S>(engine: Arc<DhtEngine<T, S>>) -> Router
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    let max_body = engine.config.max_body_bytes;
    Router::new()
        .route("/dht", post(handle_dht::<T, S>))
        .route("/system", get(handle_system::<T, S>))
        .route("/api/discovery", get(handle_discovery::<T, S>))
        .route("/api/full-sync", get(handle_full_sync::<T, S>))
        // The handler enforces the protocol cap itself so oversize bodies get
        // the wire error shape; the layer only guards the slack above it.
        .layer(DefaultBodyLimit::max(max_body * 2))
        .with_state(engine)
}

/// Serve the router until the engine's shutdown signal fires.
pub async fn serve<T, S>(
    engine: Arc<DhtEngine<T, S>>,
    listener: tokio::net::TcpListener,
) -> std::io::Result<()>
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    let mut shutdown = engine.subscribe_shutdown();
    let app = router(engine);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "DHT wire listener started");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("DHT wire listener stopping");
        })
        .await
}

fn reject(err: &DhtError) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::from_error(err))).into_response()
}

async fn handle_dht<T, S>(
    State(engine): State<Arc<DhtEngine<T, S>>>,
    body: Bytes,
) -> Response
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    if body.len() > engine.config.max_body_bytes {
        return reject(&DhtError::InvalidMessage(format!(
            "body of {} bytes exceeds the {}-byte limit",
            body.len(),
            engine.config.max_body_bytes,
        )));
    }

    let msg: DhtMessage = match serde_json::from_slice(&body) {
        Ok(msg) => msg,
        Err(e) => return reject(&DhtError::InvalidMessage(e.to_string())),
    };

    match engine.handle_message(msg).await {
        Ok(Some(response)) => Json(response).into_response(),
        // A posted response envelope was routed (or dropped); nothing to say.
        Ok(None) => Json(serde_json::json!({})).into_response(),
        Err(e) => {
            debug!(code = e.code(), error = %e, "Rejected DHT message");
            reject(&e)
        }
    }
}

async fn handle_system<T, S>(State(engine): State<Arc<DhtEngine<T, S>>>) -> Response
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    Json(engine.local_system().await).into_response()
}

async fn handle_discovery<T, S>(State(engine): State<Arc<DhtEngine<T, S>>>) -> Response
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    Json(engine.discovery_candidates().await).into_response()
}

async fn handle_full_sync<T, S>(State(engine): State<Arc<DhtEngine<T, S>>>) -> Response
where
    T: Transport + 'static,
    S: Storage + 'static,
{
    Json(engine.full_sync_snapshot().await).into_response()
}
