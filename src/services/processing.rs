use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{call_insight_summaries, find_call, transcripts_with_insights};
use crate::{
    config::LimitsConfig,
    error::ServiceError,
    llm::{ExtractedInsight, InsightGenerator, NO_INSIGHTS_SUMMARY, SUMMARY_DELIMITER},
    models::{call, insight, transcript, CallStatus},
};

/// Runs the extraction and aggregation pipeline for uploaded calls.
#[derive(Clone)]
pub struct CallProcessor {
    db: DatabaseConnection,
    generator: Arc<InsightGenerator>,
    limits: LimitsConfig,
}

impl CallProcessor {
    pub fn new(db: DatabaseConnection, generator: Arc<InsightGenerator>, limits: LimitsConfig) -> Self {
        Self {
            db,
            generator,
            limits,
        }
    }

    /// Processes every pending transcript of the call and then builds the call
    /// summary. Calls already in a terminal status are returned untouched.
    pub async fn process_call(&self, call_id: Uuid) -> Result<call::Model, ServiceError> {
        let call = find_call(&self.db, call_id).await?;
        if call.status.is_terminal() {
            info!(call_id = %call_id, status = %call.status, "call already finished, skipping");
            return Ok(call);
        }

        set_status(&self.db, &call, CallStatus::Processing).await?;

        let mut extracted = 0;
        for (transcript, existing) in transcripts_with_insights(&self.db, call_id).await? {
            if transcript.processed_at.is_some() || existing.is_some() {
                continue;
            }
            let result = self.generator.extract_insight(&transcript.transcript_text).await;
            self.store_insight(&transcript, result).await?;
            extracted += 1;
        }

        let summaries = call_insight_summaries(&self.db, call_id).await?;
        let now = Utc::now();
        let (raw_summary, ai_summary, updated_at) = match summaries.as_slice() {
            [] => (None, NO_INSIGHTS_SUMMARY.to_string(), None),
            [single] => (Some(single.clone()), single.clone(), Some(now)),
            many => (
                Some(many.join(SUMMARY_DELIMITER)),
                self.generator.summarize_call(many).await,
                Some(now),
            ),
        };

        let result = call::Entity::update_many()
            .col_expr(call::Column::Status, Expr::value(CallStatus::Processed))
            .col_expr(call::Column::RawSummary, Expr::value(raw_summary))
            .col_expr(call::Column::AiSummary, Expr::value(Some(ai_summary)))
            .col_expr(call::Column::AiSummaryUpdatedAt, Expr::value(updated_at))
            .col_expr(call::Column::UpdatedAt, Expr::value(now))
            .filter(call::Column::Id.eq(call_id))
            .filter(call::Column::Status.eq(CallStatus::Processing))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "call {} left Processing while being processed",
                call_id
            )));
        }

        info!(
            call_id = %call_id,
            extracted,
            summaries = summaries.len(),
            "call processed"
        );
        find_call(&self.db, call_id).await
    }

    async fn store_insight(
        &self,
        transcript: &transcript::Model,
        extracted: ExtractedInsight,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        // the unique index backs this up, but a duplicate would abort the whole call
        let exists = insight::Entity::find()
            .filter(insight::Column::TranscriptId.eq(transcript.id))
            .one(&txn)
            .await?
            .is_some();
        if exists {
            txn.rollback().await?;
            warn!(transcript_id = %transcript.id, "insight already exists, skipping");
            return Ok(());
        }

        let now = Utc::now();
        insight::ActiveModel {
            id: Set(Uuid::new_v4()),
            transcript_id: Set(transcript.id),
            payment_status: Set(extracted.payment_status),
            payment_amount: Set(extracted.payment_amount),
            payment_currency: Set(extracted.payment_currency),
            payment_date: Set(extracted.payment_date),
            payment_method: Set(extracted.payment_method),
            comments: Set(extracted.comments),
            ai_summary_updated_at: Set(extracted.ai_summary.as_ref().map(|_| now)),
            ai_summary: Set(extracted.ai_summary),
            user_summary: Set(None),
            user_summary_updated_at: Set(None),
            refined_summary: Set(None),
            refined_summary_updated_at: Set(None),
            summary_history: Set(None),
            llm_refinement_required: Set(false),
            llm_refinement_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        transcript::ActiveModel {
            id: Set(transcript.id),
            processed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        txn.commit().await?;
        info!(
            transcript_id = %transcript.id,
            call_id = %transcript.call_id,
            payment_status = %extracted.payment_status,
            "insight stored"
        );
        Ok(())
    }

    /// Moves a call to `Processing Failed` when its current status allows it.
    pub async fn mark_failed(&self, call_id: Uuid, reason: &str) -> Result<(), ServiceError> {
        let call = find_call(&self.db, call_id).await?;
        if !call.status.can_transition_to(CallStatus::ProcessingFailed) {
            warn!(
                call_id = %call_id,
                status = %call.status,
                "not marking call as failed"
            );
            return Ok(());
        }
        set_status(&self.db, &call, CallStatus::ProcessingFailed).await?;
        warn!(call_id = %call_id, reason, "call processing failed");
        Ok(())
    }

    /// Regenerates the call summary from the current insight summaries.
    pub async fn redo_call_summary(&self, call_id: Uuid) -> Result<call::Model, ServiceError> {
        let call = find_call(&self.db, call_id).await?;
        if call.llm_refinement_count >= self.limits.max_call_redo_count {
            return Err(ServiceError::RedoNotAllowed(format!(
                "Maximum number of call summary regenerations ({}) reached.",
                self.limits.max_call_redo_count
            )));
        }

        let summaries = call_insight_summaries(&self.db, call_id).await?;
        if summaries.is_empty() {
            return Err(ServiceError::validation(
                "No transcript summaries available for redo.",
            ));
        }

        let ai_summary = self.generator.summarize_call(&summaries).await;
        let now = Utc::now();
        let result = call::Entity::update_many()
            .col_expr(
                call::Column::RawSummary,
                Expr::value(Some(summaries.join(SUMMARY_DELIMITER))),
            )
            .col_expr(call::Column::AiSummary, Expr::value(Some(ai_summary)))
            .col_expr(call::Column::AiSummaryUpdatedAt, Expr::value(Some(now)))
            .col_expr(call::Column::LlmRefinementRequired, Expr::value(false))
            .col_expr(
                call::Column::LlmRefinementCount,
                Expr::col(call::Column::LlmRefinementCount).add(1),
            )
            .col_expr(call::Column::UpdatedAt, Expr::value(now))
            .filter(call::Column::Id.eq(call_id))
            .filter(call::Column::LlmRefinementCount.eq(call.llm_refinement_count))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Call summary was regenerated concurrently, please retry.".to_string(),
            ));
        }

        info!(
            call_id = %call_id,
            count = call.llm_refinement_count + 1,
            "call summary regenerated"
        );
        find_call(&self.db, call_id).await
    }

    /// Calls left in `Uploaded` or `Processing`, oldest first.
    pub async fn pending_calls(&self) -> Result<Vec<Uuid>, ServiceError> {
        let calls = call::Entity::find()
            .filter(
                call::Column::Status.is_in([CallStatus::Uploaded, CallStatus::Processing]),
            )
            .order_by_asc(call::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(calls.into_iter().map(|c| c.id).collect())
    }
}

/// Advances the status, guarding against a concurrent writer having moved it.
async fn set_status<C: ConnectionTrait>(
    conn: &C,
    call: &call::Model,
    next: CallStatus,
) -> Result<(), ServiceError> {
    if !call.status.can_transition_to(next) {
        return Err(ServiceError::InvalidTransition {
            from: call.status,
            to: next,
        });
    }
    let result = call::Entity::update_many()
        .col_expr(call::Column::Status, Expr::value(next))
        .col_expr(call::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(call::Column::Id.eq(call.id))
        .filter(call::Column::Status.eq(call.status))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "call {} changed status concurrently",
            call.id
        )));
    }
    Ok(())
}
