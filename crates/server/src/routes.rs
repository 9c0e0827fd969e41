//! Route configuration.

use crate::auth::{handshake_middleware, trace_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Every handshake-protected route has an `{app_id}` segment.
    let protected = Router::new()
        .route(
            "/v1/push/{app_id}/",
            get(handlers::get_hashes).post(handlers::push),
        )
        .route("/v1/pull/{app_id}/", post(handlers::pull))
        .route("/v1/submit/{app_id}/", post(handlers::submit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handshake_middleware,
        ));

    let mut router = Router::new()
        .merge(protected)
        // Unauthenticated for uptime probes
        .route("/v1/healthcheck/", get(handlers::healthcheck));

    // When enabled, this endpoint should be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
