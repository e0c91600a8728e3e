use crate::error::{not_found, ApiError};
use crate::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use base64::Engine;
use facesrec_coordinator::EnrollRequest;
use facesrec_types::UserId;
use serde::{Deserialize, Serialize};

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/recognition/register", post(register))
        .route("/recognition/recognize", post(recognize))
        .route("/recognition/update", put(update))
}

fn decode_image(image: &str) -> Result<Vec<u8>, ApiError> {
    base64::engine::general_purpose::STANDARD
        .decode(image)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid base64 image: {e}")))
}

/// `{ externalId, displayName?, clientRef?, image: base64 }`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub external_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub client_ref: Option<String>,
    pub image: String,
}

#[derive(Serialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub external_id: String,
    pub confidence: f32,
}

async fn register(
    State(state): State<ApiState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    let image = decode_image(&body.image)?;
    let outcome = state
        .coordinator
        .enroll(
            &image,
            EnrollRequest {
                external_id: body.external_id.clone(),
                display_name: body.display_name.unwrap_or_else(|| body.external_id.clone()),
                client_ref: body.client_ref.unwrap_or_default(),
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserSummary {
            user_id: outcome.user_id,
            external_id: body.external_id,
            confidence: outcome.confidence,
        }),
    ))
}

#[derive(Deserialize)]
pub struct RecognizeRequest {
    pub image: String,
}

async fn recognize(
    State(state): State<ApiState>,
    Json(body): Json<RecognizeRequest>,
) -> Result<axum::response::Response, ApiError> {
    use axum::response::IntoResponse;

    let image = decode_image(&body.image)?;
    let outcome = state
        .coordinator
        .identify(&image, facesrec_coordinator::IdentifyOptions::default())
        .await?;

    match outcome.r#match {
        Some(_) => Ok((StatusCode::OK, Json(outcome)).into_response()),
        None => Ok(not_found("no match")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub external_id: String,
    pub image: String,
}

async fn update(State(state): State<ApiState>, Json(body): Json<UpdateRequest>) -> Result<Json<UserSummary>, ApiError> {
    let image = decode_image(&body.image)?;
    let outcome = state.coordinator.update(&image, &body.external_id).await?;

    Ok(Json(UserSummary {
        user_id: outcome.user_id,
        external_id: body.external_id,
        confidence: outcome.confidence,
    }))
}
