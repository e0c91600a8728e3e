use crate::error::ApiError;
use crate::state::ApiState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use facesrec_batch::{BatchItem, JobSummary, JobView};
use facesrec_types::{JobId, JobOptions};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/recognition/batch", post(create_batch).get(list_batch))
        .route("/recognition/batch/{jobId}", get(get_batch))
}

#[derive(Deserialize)]
pub struct BatchImage {
    #[serde(default)]
    pub id: Option<String>,
    pub image: String,
}

#[derive(Deserialize)]
pub struct CreateBatchRequest {
    pub images: Vec<BatchImage>,
}

async fn create_batch(
    State(state): State<ApiState>,
    Json(body): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<JobSummary>), ApiError> {
    let mut items = Vec::with_capacity(body.images.len());
    for entry in body.images {
        let image = base64::engine::general_purpose::STANDARD
            .decode(&entry.image)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base64 image: {e}")))?;
        items.push(BatchItem { id: entry.id, image });
    }

    let summary = state.batch.create_job(items, JobOptions::default())?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

#[derive(Deserialize)]
pub struct ListBatchQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_batch(State(state): State<ApiState>, Query(query): Query<ListBatchQuery>) -> Json<Vec<JobSummary>> {
    Json(state.batch.list_jobs(query.limit))
}

async fn get_batch(State(state): State<ApiState>, Path(job_id): Path<Uuid>) -> Result<Json<JobView>, ApiError> {
    state
        .batch
        .get_job(&JobId(job_id))
        .map(Json)
        .ok_or_else(|| ApiError::Batch(facesrec_batch::BatchError::NotFound(job_id.to_string())))
}
