use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use serde::Serialize;
use uuid::Uuid;

use super::transcripts_with_insights;
use crate::{
    error::ServiceError,
    models::{
        call, insight, insight::SummaryHistoryEntry, transcript, CallStatus, PaymentCurrency,
        PaymentMethod, PaymentStatus,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call_id: Uuid,
    pub status: CallStatus,
    pub raw_summary: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_summary_updated_at: Option<DateTime<Utc>>,
    pub llm_refinement_required: bool,
    pub llm_refinement_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transcripts: Vec<TranscriptSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSummary {
    pub transcript_id: Uuid,
    pub file_name: String,
    pub position: i32,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub insight: Option<InsightSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightSummary {
    pub insight_id: Uuid,
    pub payment_status: PaymentStatus,
    pub payment_amount: Option<f64>,
    pub payment_currency: PaymentCurrency,
    pub payment_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub comments: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_summary_updated_at: Option<DateTime<Utc>>,
    pub user_summary: Option<String>,
    pub user_summary_updated_at: Option<DateTime<Utc>>,
    pub refined_summary: Option<String>,
    pub refined_summary_updated_at: Option<DateTime<Utc>>,
    pub summary_history: Vec<SummaryHistoryEntry>,
    pub llm_refinement_required: bool,
    pub llm_refinement_count: i32,
}

impl From<insight::Model> for InsightSummary {
    fn from(model: insight::Model) -> Self {
        let summary_history = model.history();
        Self {
            insight_id: model.id,
            payment_status: model.payment_status,
            payment_amount: model.payment_amount,
            payment_currency: model.payment_currency,
            payment_date: model.payment_date,
            payment_method: model.payment_method,
            comments: model.comments,
            ai_summary: model.ai_summary,
            ai_summary_updated_at: model.ai_summary_updated_at,
            user_summary: model.user_summary,
            user_summary_updated_at: model.user_summary_updated_at,
            refined_summary: model.refined_summary,
            refined_summary_updated_at: model.refined_summary_updated_at,
            summary_history,
            llm_refinement_required: model.llm_refinement_required,
            llm_refinement_count: model.llm_refinement_count,
        }
    }
}

impl TranscriptSummary {
    fn new(transcript: transcript::Model, insight: Option<insight::Model>) -> Self {
        Self {
            transcript_id: transcript.id,
            file_name: transcript.file_name,
            position: transcript.position,
            uploaded_at: transcript.uploaded_at,
            processed_at: transcript.processed_at,
            insight: insight.map(InsightSummary::from),
        }
    }
}

impl CallSummary {
    fn new(call: call::Model, transcripts: Vec<TranscriptSummary>) -> Self {
        Self {
            call_id: call.id,
            status: call.status,
            raw_summary: call.raw_summary,
            ai_summary: call.ai_summary,
            ai_summary_updated_at: call.ai_summary_updated_at,
            llm_refinement_required: call.llm_refinement_required,
            llm_refinement_count: call.llm_refinement_count,
            created_at: call.created_at,
            updated_at: call.updated_at,
            transcripts,
        }
    }
}

/// Every call, newest first, with its transcripts and insights nested.
pub async fn list_call_summaries(db: &DatabaseConnection) -> Result<Vec<CallSummary>, ServiceError> {
    let calls = call::Entity::find()
        .order_by_desc(call::Column::CreatedAt)
        .all(db)
        .await?;

    let mut summaries = Vec::with_capacity(calls.len());
    for call in calls {
        let transcripts = transcripts_with_insights(db, call.id)
            .await?
            .into_iter()
            .map(|(transcript, insight)| TranscriptSummary::new(transcript, insight))
            .collect();
        summaries.push(CallSummary::new(call, transcripts));
    }
    Ok(summaries)
}
