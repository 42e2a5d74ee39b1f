use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::LimitsConfig, error::ServiceError, llm::InsightGenerator, models::insight,
};

/// Stores user-edited summaries and merges them back through the LLM.
#[derive(Clone)]
pub struct RefinementService {
    db: DatabaseConnection,
    generator: Arc<InsightGenerator>,
    limits: LimitsConfig,
}

impl RefinementService {
    pub fn new(db: DatabaseConnection, generator: Arc<InsightGenerator>, limits: LimitsConfig) -> Self {
        Self {
            db,
            generator,
            limits,
        }
    }

    async fn find_insight(&self, transcript_id: Uuid) -> Result<insight::Model, ServiceError> {
        insight::Entity::find()
            .filter(insight::Column::TranscriptId.eq(transcript_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("No insight found for this transcript"))
    }

    pub async fn update_user_summary(
        &self,
        transcript_id: Uuid,
        user_summary: &str,
    ) -> Result<insight::Model, ServiceError> {
        let user_summary = user_summary.trim();
        if user_summary.is_empty() {
            return Err(ServiceError::validation("User summary is required"));
        }

        let insight = self.find_insight(transcript_id).await?;
        let now = Utc::now();
        let updated = insight::ActiveModel {
            id: Set(insight.id),
            user_summary: Set(Some(user_summary.to_string())),
            user_summary_updated_at: Set(Some(now)),
            llm_refinement_required: Set(true),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        info!(transcript_id = %transcript_id, insight_id = %updated.id, "user summary updated");
        Ok(updated)
    }

    /// Merges the user summary into the current base summary. Refused, with no
    /// write, when there is no user summary or the refinement cap is reached.
    pub async fn generate_refined_summary(
        &self,
        transcript_id: Uuid,
    ) -> Result<insight::Model, ServiceError> {
        let insight = self.find_insight(transcript_id).await?;

        let Some(user_summary) = insight
            .user_summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Err(ServiceError::RefinementNotAllowed(
                "A user summary is required before generating a refined summary.".to_string(),
            ));
        };
        if insight.llm_refinement_count >= self.limits.max_refinement_count {
            return Err(ServiceError::RefinementNotAllowed(format!(
                "Maximum number of refinements ({}) reached.",
                self.limits.max_refinement_count
            )));
        }

        let refined = self
            .generator
            .refine_summary(insight.base_summary(), user_summary)
            .await;

        let now = Utc::now();
        let mut history = insight.history();
        history.push(insight.snapshot(now));
        let history = serde_json::to_value(&history).map_err(anyhow::Error::from)?;

        let result = insight::Entity::update_many()
            .col_expr(insight::Column::RefinedSummary, Expr::value(Some(refined)))
            .col_expr(insight::Column::RefinedSummaryUpdatedAt, Expr::value(Some(now)))
            .col_expr(insight::Column::SummaryHistory, Expr::value(Some(history)))
            .col_expr(insight::Column::LlmRefinementRequired, Expr::value(false))
            .col_expr(
                insight::Column::LlmRefinementCount,
                Expr::col(insight::Column::LlmRefinementCount).add(1),
            )
            .col_expr(insight::Column::UpdatedAt, Expr::value(now))
            .filter(insight::Column::Id.eq(insight.id))
            .filter(insight::Column::LlmRefinementCount.eq(insight.llm_refinement_count))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Summary was refined concurrently, please retry.".to_string(),
            ));
        }

        info!(
            transcript_id = %transcript_id,
            insight_id = %insight.id,
            count = insight.llm_refinement_count + 1,
            "refined summary generated"
        );
        self.find_insight(transcript_id).await
    }
}
