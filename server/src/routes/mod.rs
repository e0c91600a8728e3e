mod batch;
mod health;
mod index;
mod metrics;
mod recognition;

use crate::state::ApiState;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assembles the full HTTP surface. Each feature area gets
/// its own `Router<ApiState>` merged in. Authentication and request
/// validation are the routing layer's concern, not this crate's.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .merge(recognition::router())
        .merge(batch::router())
        .merge(index::router())
        .merge(health::router())
        .merge(metrics::router())
        .layer(from_fn_with_state(state.clone(), metrics::track_http_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
