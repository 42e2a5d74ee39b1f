use sea_orm::entity::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::{boolean, integer, string, text_null, timestamp, timestamp_null};
use sea_orm_migration::sea_query::{ColumnDef, Expr};
use serde::{Deserialize, Serialize};

use super::CallStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "calls")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: CallStatus,
    pub raw_summary: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_summary_updated_at: Option<DateTimeUtc>,
    pub llm_refinement_required: bool,
    pub llm_refinement_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transcript::Entity")]
    Transcripts,
}

impl Related<super::transcript::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transcripts.def()
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
                    .col(
                        string(Column::Status)
                            .char_len(32)
                            .default(CallStatus::Uploaded.as_str()),
                    )
                    .col(text_null(Column::RawSummary))
                    .col(text_null(Column::AiSummary))
                    .col(timestamp_null(Column::AiSummaryUpdatedAt))
                    .col(boolean(Column::LlmRefinementRequired).default(false))
                    .col(integer(Column::LlmRefinementCount).default(0))
                    .col(timestamp(Column::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp(Column::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_calls_status")
                    .table(Entity)
                    .col(Column::Status)
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
