use crate::error::ApiError;
use crate::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use facesrec_index::RebuildUser;
use serde::Serialize;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/recognition/index/rebuild", post(rebuild))
        .route("/recognition/stats", get(stats))
}

/// Kicks off an async rebuild from the descriptor store and returns
/// immediately: the response is sent before the task finishes, the same
/// way `facesrec_batch` runs jobs off the HTTP response.
async fn rebuild(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    let users = state
        .store
        .list_active()
        .await
        .map_err(|e| facesrec_coordinator::CoordinatorError::Internal(e.to_string()))?;

    let index = state.index.clone();
    tokio::spawn(async move {
        let rebuild_rows: Vec<RebuildUser> = users
            .into_iter()
            .map(|u| RebuildUser {
                user_id: u.user_id,
                external_id: u.external_id,
                display_name: u.display_name,
                client_ref: u.client_ref,
                descriptor_json: u.descriptor.to_json(),
            })
            .collect();
        if let Err(e) = index.rebuild(&rebuild_rows) {
            tracing::error!(error = %e, "index rebuild failed");
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[derive(Serialize)]
struct StatsResponse {
    recognition: facesrec_coordinator::StatsSnapshot,
    index: facesrec_index::IndexStats,
    active_users: u64,
    cache_mode: &'static str,
}

async fn stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let active_users = state.store.count_active().await.unwrap_or_default();
    let cache_mode = match state.cache.mode() {
        facesrec_cache::CacheMode::Redis => "redis",
        facesrec_cache::CacheMode::Memory => "memory",
    };
    Json(StatsResponse {
        recognition: state.coordinator.stats(),
        index: state.index.stats(),
        active_users,
        cache_mode,
    })
}
