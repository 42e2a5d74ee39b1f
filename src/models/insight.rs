use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::{
    boolean, date_null, double_null, integer, json_null, string, string_null, text_null,
    timestamp, timestamp_null,
};
use sea_orm_migration::sea_query::{
    ColumnDef, Expr, ForeignKeyAction as MigrationForeignKeyAction,
};
use serde::{Deserialize, Serialize};

use super::{PaymentCurrency, PaymentMethod, PaymentStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "insights")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub transcript_id: Uuid,
    pub payment_status: PaymentStatus,
    pub payment_amount: Option<f64>,
    pub payment_currency: PaymentCurrency,
    pub payment_date: Option<Date>,
    pub payment_method: Option<PaymentMethod>,
    pub comments: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_summary_updated_at: Option<DateTimeUtc>,
    pub user_summary: Option<String>,
    pub user_summary_updated_at: Option<DateTimeUtc>,
    pub refined_summary: Option<String>,
    pub refined_summary_updated_at: Option<DateTimeUtc>,
    pub summary_history: Option<Json>,
    pub llm_refinement_required: bool,
    pub llm_refinement_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Snapshot of the summaries an insight held before a refinement replaced them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub ai_summary: Option<String>,
    pub user_summary: Option<String>,
    pub refined_summary: Option<String>,
}

impl Model {
    pub fn history(&self) -> Vec<SummaryHistoryEntry> {
        self.summary_history
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    /// The summary a refinement builds on: the last refined text, else the AI one.
    pub fn base_summary(&self) -> &str {
        self.refined_summary
            .as_deref()
            .or(self.ai_summary.as_deref())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> SummaryHistoryEntry {
        SummaryHistoryEntry {
            timestamp,
            ai_summary: self.ai_summary.clone(),
            user_summary: self.user_summary.clone(),
            refined_summary: self.refined_summary.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transcript::Entity",
        from = "Column::TranscriptId",
        to = "super::transcript::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Transcript,
}

impl Related<super::transcript::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transcript.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Entity)
                    .if_not_exists()
                    .col(ColumnDef::new(Column::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Column::TranscriptId).uuid().not_null())
                    .col(
                        string(Column::PaymentStatus)
                            .char_len(32)
                            .default(PaymentStatus::Pending.as_str()),
                    )
                    .col(double_null(Column::PaymentAmount))
                    .col(
                        string(Column::PaymentCurrency)
                            .char_len(16)
                            .default(PaymentCurrency::Usd.as_str()),
                    )
                    .col(date_null(Column::PaymentDate))
                    .col(string_null(Column::PaymentMethod).char_len(32))
                    .col(text_null(Column::Comments))
                    .col(text_null(Column::AiSummary))
                    .col(timestamp_null(Column::AiSummaryUpdatedAt))
                    .col(text_null(Column::UserSummary))
                    .col(timestamp_null(Column::UserSummaryUpdatedAt))
                    .col(text_null(Column::RefinedSummary))
                    .col(timestamp_null(Column::RefinedSummaryUpdatedAt))
                    .col(json_null(Column::SummaryHistory))
                    .col(boolean(Column::LlmRefinementRequired).default(false))
                    .col(integer(Column::LlmRefinementCount).default(0))
                    .col(timestamp(Column::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp(Column::UpdatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_insights_transcript")
                            .from(Entity, Column::TranscriptId)
                            .to(super::transcript::Entity, super::transcript::Column::Id)
                            .on_delete(MigrationForeignKeyAction::Cascade)
                            .on_update(MigrationForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_insights_transcript_id")
                    .table(Entity)
                    .col(Column::TranscriptId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Entity).to_owned())
            .await
    }
}
