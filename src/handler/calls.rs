use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::ServiceError,
    services::{summaries, upload, UploadedFile},
};

const UPLOAD_FIELD: &str = "files";

pub async fn upload_call(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ServiceError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("transcript_{}.txt", files.len() + 1));
        let bytes = field.bytes().await.map_err(|e| {
            ServiceError::validation(format!("Failed to read {}: {}", file_name, e))
        })?;
        files.push(UploadedFile {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    let uploads = upload::validate_files(files, &state.config.limits)?;
    let call = upload::create_call(&state.db, uploads).await?;

    // rows are committed, so a failed enqueue is picked up again on restart
    if let Err(e) = state.queue.enqueue(call.id) {
        error!(call_id = %call.id, "failed to enqueue call: {}", e);
    }

    Ok(Json(json!({
        "call_id": call.id,
        "message": "Call uploaded successfully. Processing in background.",
    })))
}

pub async fn list_summaries(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let summaries = summaries::list_call_summaries(&state.db).await?;
    Ok(Json(json!({ "summaries": summaries })))
}

pub async fn redo_call_summary(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> Result<Json<Value>, ServiceError> {
    let call = state.processor.redo_call_summary(call_id).await?;
    info!(call_id = %call.id, "call summary redo requested");
    Ok(Json(json!({
        "message": "Call summary regenerated successfully.",
        "call_id": call.id,
        "ai_summary": call.ai_summary,
        "ai_summary_updated_at": call.ai_summary_updated_at,
        "llm_refinement_count": call.llm_refinement_count,
    })))
}
