use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    models::{call, insight, transcript},
};

pub mod processing;
pub mod refinement;
pub mod summaries;
pub mod upload;
#[cfg(test)]
mod tests;

pub use processing::CallProcessor;
pub use refinement::RefinementService;
pub use upload::UploadedFile;

pub(crate) async fn find_call<C: ConnectionTrait>(
    conn: &C,
    call_id: Uuid,
) -> Result<call::Model, ServiceError> {
    call::Entity::find_by_id(call_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Call not found"))
}

/// Transcripts of a call in upload order, each with its insight if one exists.
pub(crate) async fn transcripts_with_insights<C: ConnectionTrait>(
    conn: &C,
    call_id: Uuid,
) -> Result<Vec<(transcript::Model, Option<insight::Model>)>, ServiceError> {
    let rows = transcript::Entity::find()
        .filter(transcript::Column::CallId.eq(call_id))
        .order_by_asc(transcript::Column::Position)
        .order_by_asc(transcript::Column::UploadedAt)
        .order_by_asc(transcript::Column::Id)
        .find_also_related(insight::Entity)
        .all(conn)
        .await?;
    Ok(rows)
}

/// Non-empty insight summaries of a call, in upload order.
pub(crate) async fn call_insight_summaries<C: ConnectionTrait>(
    conn: &C,
    call_id: Uuid,
) -> Result<Vec<String>, ServiceError> {
    let summaries = transcripts_with_insights(conn, call_id)
        .await?
        .into_iter()
        .filter_map(|(_, insight)| insight.and_then(|i| i.ai_summary))
        .map(|summary| summary.trim().to_string())
        .filter(|summary| !summary.is_empty())
        .collect();
    Ok(summaries)
}
