use sea_orm::entity::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::{integer, string, text, timestamp, timestamp_null};
use sea_orm_migration::sea_query::{
    ColumnDef, Expr, ForeignKeyAction as MigrationForeignKeyAction,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transcripts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub call_id: Uuid,
    pub file_name: String,
    /// Zero-based index of the file within its upload request.
    pub position: i32,
    #[sea_orm(column_type = "Text")]
    pub transcript_text: String,
    pub uploaded_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::call::Entity",
        from = "Column::CallId",
        to = "super::call::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Call,
    #[sea_orm(has_one = "super::insight::Entity")]
    Insight,
}

impl Related<super::call::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Call.def()
    }
}

impl Related<super::insight::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Insight.def()
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
                    .col(ColumnDef::new(Column::CallId).uuid().not_null())
                    .col(string(Column::FileName).char_len(255))
                    .col(integer(Column::Position).default(0))
                    .col(text(Column::TranscriptText))
                    .col(timestamp(Column::UploadedAt).default(Expr::current_timestamp()))
                    .col(timestamp_null(Column::ProcessedAt))
                    .col(timestamp(Column::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp(Column::UpdatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transcripts_call")
                            .from(Entity, Column::CallId)
                            .to(super::call::Entity, super::call::Column::Id)
                            .on_delete(MigrationForeignKeyAction::Cascade)
                            .on_update(MigrationForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transcripts_call_id")
                    .table(Entity)
                    .col(Column::CallId)
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
