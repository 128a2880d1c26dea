//! HTTP API for the order fulfillment system.
//!
//! Endpoints for order creation and lookup, inventory availability,
//! payment provider webhooks and admin cancellation, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod context;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use context::{AppContext, AppRuntime};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(context: Arc<AppContext>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/inventory/{product_id}", get(routes::inventory::get))
        .route("/webhooks/payment", post(routes::webhooks::payment))
        .route("/admin/orders", get(routes::admin::list))
        .route("/admin/orders/{id}/cancel", post(routes::admin::cancel))
        .with_state(context)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
