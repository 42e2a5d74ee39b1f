use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::LimitsConfig,
    error::ServiceError,
    models::{call, transcript, CallStatus},
};

/// A file as received from the multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptUpload {
    pub file_name: String,
    pub text: String,
}

/// Checks every file before anything is written.
pub fn validate_files(
    files: Vec<UploadedFile>,
    limits: &LimitsConfig,
) -> Result<Vec<TranscriptUpload>, ServiceError> {
    if files.is_empty() {
        return Err(ServiceError::validation(
            "At least one transcript file is required.",
        ));
    }
    if files.len() > limits.max_transcripts_per_call {
        return Err(ServiceError::validation(format!(
            "A call can have a maximum of {} transcripts.",
            limits.max_transcripts_per_call
        )));
    }

    files
        .into_iter()
        .map(|file| {
            let text = String::from_utf8(file.bytes).map_err(|_| {
                ServiceError::validation(format!(
                    "Failed to decode {}: transcripts must be UTF-8 text.",
                    file.file_name
                ))
            })?;
            if text.chars().count() > limits.max_transcript_length {
                return Err(ServiceError::validation(format!(
                    "Transcript {} exceeds the maximum length of {} characters.",
                    file.file_name, limits.max_transcript_length
                )));
            }
            Ok(TranscriptUpload {
                file_name: file.file_name,
                text,
            })
        })
        .collect()
}

/// Inserts the call and its transcripts in one transaction.
pub async fn create_call(
    db: &DatabaseConnection,
    uploads: Vec<TranscriptUpload>,
) -> Result<call::Model, ServiceError> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let call = call::ActiveModel {
        id: Set(Uuid::new_v4()),
        status: Set(CallStatus::Uploaded),
        raw_summary: Set(None),
        ai_summary: Set(None),
        ai_summary_updated_at: Set(None),
        llm_refinement_required: Set(false),
        llm_refinement_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let count = uploads.len();
    for (position, upload) in uploads.into_iter().enumerate() {
        let uploaded_at = Utc::now();
        transcript::ActiveModel {
            id: Set(Uuid::new_v4()),
            call_id: Set(call.id),
            file_name: Set(upload.file_name),
            position: Set(position as i32),
            transcript_text: Set(upload.text),
            uploaded_at: Set(uploaded_at),
            processed_at: Set(None),
            created_at: Set(uploaded_at),
            updated_at: Set(uploaded_at),
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    info!(call_id = %call.id, transcripts = count, "call uploaded");
    Ok(call)
}
