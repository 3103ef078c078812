//! Prometheus scrape endpoint

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// GET /metrics
///
/// Login, reconciliation and error counters in Prometheus text format.
async fn scrape() -> Response {
    let encoder = TextEncoder::new();

    encoder
        .encode_to_string(&REGISTRY.gather())
        .map(|body| {
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                body,
            )
                .into_response()
        })
        .unwrap_or_else(|error| {
            tracing::error!(%error, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        })
}

/// Create metrics router
///
/// Stateless; merged after the stateful routes.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(scrape))
}
