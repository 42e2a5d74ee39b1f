use axum::{
    routing::{get, post, put},
    Router,
};

use crate::app::AppState;

pub mod calls;
pub mod health;
pub mod middleware;
pub mod transcripts;

/// Routes served under the configured API prefix.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/apis/calls/upload_call", post(calls::upload_call))
        .route("/apis/calls/summaries", get(calls::list_summaries))
        .route(
            "/apis/calls/redo_call_summary/{call_id}",
            post(calls::redo_call_summary),
        )
        .route(
            "/apis/transcripts/update_user_summary/{transcript_id}",
            put(transcripts::update_user_summary),
        )
        .route(
            "/apis/transcripts/generate_refined_summary/{transcript_id}",
            post(transcripts::generate_refined_summary),
        )
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health::health_check))
}
