//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/aets/{aet}/rs/studies", post(handlers::store_instances))
        .route(
            "/aets/{aet}/rs/studies/{study}",
            post(handlers::store_study_instances),
        )
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/health", get(handlers::health_check));

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
