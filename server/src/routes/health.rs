use crate::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
struct DetailedHealth {
    index_initialized: bool,
    index_size: u64,
    cache_mode: &'static str,
    active_users: u64,
}

async fn health_detailed(State(state): State<ApiState>) -> Json<DetailedHealth> {
    let cache_mode = match state.cache.mode() {
        facesrec_cache::CacheMode::Redis => "redis",
        facesrec_cache::CacheMode::Memory => "memory",
    };
    Json(DetailedHealth {
        index_initialized: state.index.is_initialized(),
        index_size: state.index.size(),
        cache_mode,
        active_users: state.store.count_active().await.unwrap_or_default(),
    })
}
