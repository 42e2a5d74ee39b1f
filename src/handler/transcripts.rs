use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{app::AppState, error::ServiceError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserSummaryPayload {
    pub user_summary: Option<String>,
}

pub async fn update_user_summary(
    State(state): State<AppState>,
    Path(transcript_id): Path<Uuid>,
    Json(payload): Json<UserSummaryPayload>,
) -> Result<Json<Value>, ServiceError> {
    let user_summary = payload.user_summary.unwrap_or_default();
    let insight = state
        .refinement
        .update_user_summary(transcript_id, &user_summary)
        .await?;

    Ok(Json(json!({
        "message": "User summary updated successfully.",
        "transcript_id": transcript_id,
        "insight_id": insight.id,
        "user_summary": insight.user_summary,
        "user_summary_updated_at": insight.user_summary_updated_at,
    })))
}

pub async fn generate_refined_summary(
    State(state): State<AppState>,
    Path(transcript_id): Path<Uuid>,
) -> Result<Json<Value>, ServiceError> {
    let insight = state
        .refinement
        .generate_refined_summary(transcript_id)
        .await?;

    Ok(Json(json!({
        "message": "Refined summary generated successfully.",
        "transcript_id": transcript_id,
        "insight_id": insight.id,
        "refined_summary": insight.refined_summary,
        "refined_summary_updated_at": insight.refined_summary_updated_at,
        "llm_refinement_count": insight.llm_refinement_count,
        "llm_refinement_required": insight.llm_refinement_required,
    })))
}
