//! HTTP transport.
//!
//! One POST endpoint carries the whole protocol: the request body is a
//! bincode [`Operation`](kite_proto::Operation), the response body a
//! bincode [`Response`]. Protocol-level failures (Error, Retry) still
//! answer HTTP 200; the status lives inside the wire response. A GET
//! endpoint serves the per-table statistics snapshot as JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tracing::info;

use kite_common::MAX_VALUE_SIZE;
use kite_proto::Response;

use crate::dispatcher::Dispatcher;

/// Builds the server router.
#[must_use]
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", post(handle_operation))
        .route("/stats", get(handle_stats))
        .layer(DefaultBodyLimit::max(2 * MAX_VALUE_SIZE))
        .with_state(dispatcher)
}

/// Serves the router on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}

async fn handle_operation(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Bytes,
) -> impl IntoResponse {
    let response = dispatcher.dispatch_bytes(&body).await;
    match response.encode() {
        Ok(encoded) => (StatusCode::OK, encoded).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn handle_stats(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(dispatcher.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use kite_proto::{Operation, Status};
    use kite_store::Store;
    use tower::ServiceExt;

    async fn call(app: Router, body: Vec<u8>) -> Response {
        let http_response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(http_response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(http_response.into_body(), usize::MAX)
            .await
            .unwrap();
        Response::decode(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_roundtrip() {
        let dispatcher = Arc::new(Dispatcher::standalone(Arc::new(Store::default())));
        let app = router(dispatcher);

        let op = Operation::Create {
            table: "t".to_string(),
        };
        let response = call(app, op.encode().unwrap()).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_garbage_body_keeps_http_ok() {
        let dispatcher = Arc::new(Dispatcher::standalone(Arc::new(Store::default())));
        let app = router(dispatcher);

        let response = call(app, vec![0xff; 8]).await;
        assert_eq!(response.status, Status::Error);
    }

    #[tokio::test]
    async fn test_stats_endpoint_is_json() {
        let dispatcher = Arc::new(Dispatcher::standalone(Arc::new(Store::default())));
        let app = router(dispatcher);

        let http_response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(http_response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(http_response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("tables").is_some());
    }
}
