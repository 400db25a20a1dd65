use crate::metrics::Aggregator;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub fn router(aggregator: Arc<Aggregator>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(aggregator)
}

/// Serve `/metrics` on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, aggregator: Arc<Aggregator>) {
    match listener.local_addr() {
        Ok(addr) => info!("Serving metrics on http://{}/metrics", addr),
        Err(e) => error!("Metrics listener has no local address: {}", e),
    }
    if let Err(e) = axum::serve(listener, router(aggregator)).await {
        error!("Metrics server stopped: {}", e);
    }
}

pub async fn metrics_handler(State(aggregator): State<Arc<Aggregator>>) -> Response {
    match aggregator.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
