use super::*;
use crate::{
    config::{LimitsConfig, LlmConfig},
    llm::{ChatRequest, InsightGenerator, LlmClient, RequestKind, NO_INSIGHTS_SUMMARY},
    models::{create_db, CallStatus, PaymentStatus},
};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{sea_query::Expr, DatabaseConnection};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tokio::sync::Barrier;

// Replies to extraction prompts from a queue and records every request.
// Call summary and refinement replies wait on `gate` so tests can line up
// concurrent requests.
struct ScriptedClient {
    requests: Mutex<Vec<ChatRequest>>,
    extractions: Mutex<VecDeque<String>>,
    gate: Barrier,
}

impl ScriptedClient {
    fn new(extractions: Vec<String>) -> Arc<Self> {
        Self::gated(extractions, 1)
    }

    fn gated(extractions: Vec<String>, waiters: usize) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            extractions: Mutex::new(extractions.into()),
            gate: Barrier::new(waiters),
        })
    }

    fn count(&self, kind: RequestKind) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    fn total(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate_response(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match request.kind {
            RequestKind::Extraction => self
                .extractions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted extraction left")),
            RequestKind::CallSummary => {
                self.gate.wait().await;
                Ok("Merged call summary.".to_string())
            }
            RequestKind::Refinement => {
                self.gate.wait().await;
                Ok("Refined by the model.".to_string())
            }
        }
    }
}

struct Fixture {
    db: DatabaseConnection,
    client: Arc<ScriptedClient>,
    processor: CallProcessor,
    refinement: RefinementService,
}

async fn fixture(extractions: Vec<String>, limits: LimitsConfig) -> Fixture {
    fixture_with(ScriptedClient::new(extractions), limits).await
}

async fn fixture_with(client: Arc<ScriptedClient>, limits: LimitsConfig) -> Fixture {
    let db = create_db("sqlite::memory:").await.unwrap();
    let generator = Arc::new(InsightGenerator::new(LlmConfig::default(), client.clone()));
    Fixture {
        processor: CallProcessor::new(db.clone(), generator.clone(), limits.clone()),
        refinement: RefinementService::new(db.clone(), generator, limits),
        db,
        client,
    }
}

fn files(names: &[&str]) -> Vec<UploadedFile> {
    names
        .iter()
        .map(|name| UploadedFile {
            file_name: name.to_string(),
            bytes: format!("Agent: hello from {}\nCustomer: hi", name).into_bytes(),
        })
        .collect()
}

async fn upload(fx: &Fixture, names: &[&str]) -> call::Model {
    let uploads = upload::validate_files(files(names), &LimitsConfig::default()).unwrap();
    upload::create_call(&fx.db, uploads).await.unwrap()
}

fn extraction(summary: &str) -> String {
    serde_json::json!({
        "payment_status": "Committed",
        "payment_amount": 120.5,
        "payment_currency": "USD",
        "payment_date": "2024-06-01",
        "payment_method": "ACH",
        "ai_summary": summary,
    })
    .to_string()
}

#[test]
fn test_validate_files() {
    let limits = LimitsConfig::default();

    let err = upload::validate_files(files(&["1", "2", "3", "4", "5"]), &limits).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(err.to_string(), "A call can have a maximum of 4 transcripts.");

    assert!(upload::validate_files(Vec::new(), &limits).is_err());

    let bad = vec![UploadedFile {
        file_name: "bad.txt".to_string(),
        bytes: vec![0xff, 0xfe, 0x00],
    }];
    let err = upload::validate_files(bad, &limits).unwrap_err();
    assert!(err.to_string().contains("bad.txt"));

    let small = LimitsConfig {
        max_transcript_length: 5,
        ..Default::default()
    };
    assert!(upload::validate_files(files(&["long.txt"]), &small).is_err());

    let ok = upload::validate_files(files(&["1", "2", "3", "4"]), &limits).unwrap();
    assert_eq!(ok.len(), 4);
    assert_eq!(ok[0].file_name, "1");
}

#[tokio::test]
async fn test_create_call_persists_transcripts() {
    let fx = fixture(Vec::new(), LimitsConfig::default()).await;
    let call = upload(&fx, &["a.txt", "b.txt", "c.txt"]).await;
    assert_eq!(call.status, CallStatus::Uploaded);

    let rows = transcripts_with_insights(&fx.db, call.id).await.unwrap();
    let names: Vec<_> = rows.iter().map(|(t, _)| t.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    assert!(rows.iter().all(|(t, i)| t.processed_at.is_none() && i.is_none()));
}

#[tokio::test]
async fn test_transcript_order_survives_equal_timestamps() {
    let fx = fixture(Vec::new(), LimitsConfig::default()).await;
    let call = upload(&fx, &["d.txt", "c.txt", "b.txt", "a.txt"]).await;

    transcript::Entity::update_many()
        .col_expr(
            transcript::Column::UploadedAt,
            Expr::value(call.created_at),
        )
        .filter(transcript::Column::CallId.eq(call.id))
        .exec(&fx.db)
        .await
        .unwrap();

    let rows = transcripts_with_insights(&fx.db, call.id).await.unwrap();
    let order: Vec<_> = rows
        .iter()
        .map(|(t, _)| (t.position, t.file_name.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![(0, "d.txt"), (1, "c.txt"), (2, "b.txt"), (3, "a.txt")]
    );
}

#[tokio::test]
async fn test_single_summary_copied_verbatim() {
    let fx = fixture(vec![extraction("Customer agreed to pay by ACH.")], LimitsConfig::default()).await;
    let call = upload(&fx, &["only.txt"]).await;

    let processed = fx.processor.process_call(call.id).await.unwrap();
    assert_eq!(processed.status, CallStatus::Processed);
    assert_eq!(
        processed.ai_summary.as_deref(),
        Some("Customer agreed to pay by ACH.")
    );
    assert!(processed.ai_summary_updated_at.is_some());
    assert_eq!(fx.client.count(RequestKind::Extraction), 1);
    assert_eq!(fx.client.count(RequestKind::CallSummary), 0);

    let rows = transcripts_with_insights(&fx.db, call.id).await.unwrap();
    let (transcript, insight) = &rows[0];
    assert!(transcript.processed_at.is_some());
    let insight = insight.as_ref().unwrap();
    assert_eq!(insight.payment_status, PaymentStatus::Committed);
    assert_eq!(insight.payment_amount, Some(120.5));
}

#[tokio::test]
async fn test_multiple_summaries_aggregated_once() {
    let fx = fixture(
        vec![extraction("First part."), extraction("Second part.")],
        LimitsConfig::default(),
    )
    .await;
    let call = upload(&fx, &["1.txt", "2.txt"]).await;

    let processed = fx.processor.process_call(call.id).await.unwrap();
    assert_eq!(fx.client.count(RequestKind::CallSummary), 1);
    assert_eq!(processed.ai_summary.as_deref(), Some("Merged call summary."));
    assert_eq!(
        processed.raw_summary.as_deref(),
        Some("First part. ||| Second part.")
    );
}

#[tokio::test]
async fn test_malformed_llm_output_yields_default_insight() {
    let fx = fixture(vec!["this is not json at all".to_string()], LimitsConfig::default()).await;
    let call = upload(&fx, &["broken.txt"]).await;

    let processed = fx.processor.process_call(call.id).await.unwrap();
    assert_eq!(processed.status, CallStatus::Processed);

    let rows = transcripts_with_insights(&fx.db, call.id).await.unwrap();
    let insight = rows[0].1.as_ref().unwrap();
    assert_eq!(insight.payment_status, PaymentStatus::Pending);
    assert_eq!(insight.payment_amount, None);
    assert!(insight
        .ai_summary
        .as_deref()
        .unwrap()
        .starts_with("Error processing transcript:"));
}

#[tokio::test]
async fn test_no_summaries_uses_placeholder() {
    let fx = fixture(vec![r#"{"payment_status": "Pending"}"#.to_string()], LimitsConfig::default()).await;
    let call = upload(&fx, &["quiet.txt"]).await;

    let processed = fx.processor.process_call(call.id).await.unwrap();
    assert_eq!(processed.ai_summary.as_deref(), Some(NO_INSIGHTS_SUMMARY));
    assert!(processed.ai_summary_updated_at.is_none());
    assert_eq!(fx.client.count(RequestKind::CallSummary), 0);
}

#[tokio::test]
async fn test_processed_call_is_not_reprocessed() {
    let fx = fixture(vec![extraction("Done.")], LimitsConfig::default()).await;
    let call = upload(&fx, &["once.txt"]).await;

    let first = fx.processor.process_call(call.id).await.unwrap();
    let requests = fx.client.total();
    let second = fx.processor.process_call(call.id).await.unwrap();
    assert_eq!(fx.client.total(), requests);
    assert_eq!(first, second);

    // a terminal status never changes
    fx.processor.mark_failed(call.id, "late failure").await.unwrap();
    let current = find_call(&fx.db, call.id).await.unwrap();
    assert_eq!(current.status, CallStatus::Processed);
}

#[tokio::test]
async fn test_mark_failed_and_pending_calls() {
    let fx = fixture(Vec::new(), LimitsConfig::default()).await;
    let failed = upload(&fx, &["x.txt"]).await;
    let waiting = upload(&fx, &["y.txt"]).await;

    fx.processor.mark_failed(failed.id, "boom").await.unwrap();
    let current = find_call(&fx.db, failed.id).await.unwrap();
    assert_eq!(current.status, CallStatus::ProcessingFailed);

    let pending = fx.processor.pending_calls().await.unwrap();
    assert_eq!(pending, vec![waiting.id]);

    let unchanged = fx.processor.process_call(failed.id).await.unwrap();
    assert_eq!(unchanged.status, CallStatus::ProcessingFailed);
    assert_eq!(fx.client.total(), 0);

    let err = fx.processor.process_call(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_user_summary_validation() {
    let fx = fixture(vec![extraction("Summary.")], LimitsConfig::default()).await;
    let call = upload(&fx, &["t.txt"]).await;
    let rows = transcripts_with_insights(&fx.db, call.id).await.unwrap();
    let transcript_id = rows[0].0.id;

    // no insight before processing
    let err = fx
        .refinement
        .update_user_summary(transcript_id, "Edited")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(err.to_string(), "No insight found for this transcript");

    fx.processor.process_call(call.id).await.unwrap();

    let err = fx
        .refinement
        .update_user_summary(transcript_id, "   ")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "User summary is required");

    let updated = fx
        .refinement
        .update_user_summary(transcript_id, " Customer will pay Friday. ")
        .await
        .unwrap();
    assert_eq!(updated.user_summary.as_deref(), Some("Customer will pay Friday."));
    assert!(updated.user_summary_updated_at.is_some());
    assert!(updated.llm_refinement_required);
}

#[tokio::test]
async fn test_refinement_cap_and_history() {
    let limits = LimitsConfig {
        max_refinement_count: 2,
        ..Default::default()
    };
    let fx = fixture(vec![extraction("Original AI summary.")], limits).await;
    let call = upload(&fx, &["t.txt"]).await;
    fx.processor.process_call(call.id).await.unwrap();
    let transcript_id = transcripts_with_insights(&fx.db, call.id).await.unwrap()[0].0.id;

    let err = fx
        .refinement
        .generate_refined_summary(transcript_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RefinementNotAllowed(_)));
    assert_eq!(fx.client.count(RequestKind::Refinement), 0);

    fx.refinement
        .update_user_summary(transcript_id, "Expert edit.")
        .await
        .unwrap();

    let first = fx
        .refinement
        .generate_refined_summary(transcript_id)
        .await
        .unwrap();
    assert_eq!(first.refined_summary.as_deref(), Some("Refined by the model."));
    assert_eq!(first.llm_refinement_count, 1);
    assert!(!first.llm_refinement_required);
    let history = first.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].ai_summary.as_deref(), Some("Original AI summary."));
    assert_eq!(history[0].refined_summary, None);

    let second = fx
        .refinement
        .generate_refined_summary(transcript_id)
        .await
        .unwrap();
    assert_eq!(second.llm_refinement_count, 2);
    assert_eq!(second.history().len(), 2);
    assert_eq!(
        second.history()[1].refined_summary.as_deref(),
        Some("Refined by the model.")
    );

    let err = fx
        .refinement
        .generate_refined_summary(transcript_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RefinementNotAllowed(_)));
    assert_eq!(fx.client.count(RequestKind::Refinement), 2);

    let after = insight::Entity::find_by_id(second.id)
        .one(&fx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after, second);
}

#[tokio::test]
async fn test_redo_call_summary_cap() {
    let limits = LimitsConfig {
        max_call_redo_count: 1,
        ..Default::default()
    };
    let fx = fixture(vec![extraction("Only summary.")], limits).await;
    let call = upload(&fx, &["t.txt"]).await;
    fx.processor.process_call(call.id).await.unwrap();

    let redone = fx.processor.redo_call_summary(call.id).await.unwrap();
    assert_eq!(redone.ai_summary.as_deref(), Some("Merged call summary."));
    assert_eq!(redone.llm_refinement_count, 1);
    assert!(!redone.llm_refinement_required);
    assert_eq!(fx.client.count(RequestKind::CallSummary), 1);

    let err = fx.processor.redo_call_summary(call.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::RedoNotAllowed(_)));
    assert_eq!(fx.client.count(RequestKind::CallSummary), 1);
}

#[tokio::test]
async fn test_redo_without_summaries() {
    let fx = fixture(Vec::new(), LimitsConfig::default()).await;
    let call = upload(&fx, &["t.txt"]).await;

    let err = fx.processor.redo_call_summary(call.id).await.unwrap_err();
    assert_eq!(err.to_string(), "No transcript summaries available for redo.");
}

#[tokio::test]
async fn test_list_call_summaries_nests_insights() {
    let fx = fixture(vec![extraction("Nested.")], LimitsConfig::default()).await;
    let processed = upload(&fx, &["p.txt"]).await;
    fx.processor.process_call(processed.id).await.unwrap();
    let waiting = upload(&fx, &["w1.txt", "w2.txt"]).await;

    let summaries = summaries::list_call_summaries(&fx.db).await.unwrap();
    assert_eq!(summaries.len(), 2);

    let by_id = |id| summaries.iter().find(|s| s.call_id == id).unwrap();
    let done = by_id(processed.id);
    assert_eq!(done.status, CallStatus::Processed);
    assert_eq!(
        done.transcripts[0].insight.as_ref().unwrap().ai_summary.as_deref(),
        Some("Nested.")
    );

    let pending = by_id(waiting.id);
    assert_eq!(pending.transcripts.len(), 2);
    assert!(pending.transcripts.iter().all(|t| t.insight.is_none()));

    let json = serde_json::to_value(done).unwrap();
    assert_eq!(json["status"], "Processed");
    assert_eq!(json["transcripts"][0]["insight"]["payment_method"], "ACH");
}

#[tokio::test]
async fn test_concurrent_refinements_respect_cap() {
    let limits = LimitsConfig {
        max_refinement_count: 1,
        ..Default::default()
    };
    let client = ScriptedClient::gated(vec![extraction("Original AI summary.")], 2);
    let fx = fixture_with(client, limits).await;
    let call = upload(&fx, &["t.txt"]).await;
    fx.processor.process_call(call.id).await.unwrap();
    let transcript_id = transcripts_with_insights(&fx.db, call.id).await.unwrap()[0].0.id;
    fx.refinement
        .update_user_summary(transcript_id, "Expert edit.")
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        fx.refinement.generate_refined_summary(transcript_id),
        fx.refinement.generate_refined_summary(transcript_id)
    );
    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        other => panic!("expected exactly one refinement to win, got {:?}", other),
    };
    assert!(matches!(lost, ServiceError::Conflict(_)));
    assert_eq!(won.llm_refinement_count, 1);

    let stored = insight::Entity::find_by_id(won.id)
        .one(&fx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.llm_refinement_count, 1);
    assert_eq!(stored.history().len(), 1);
}

#[tokio::test]
async fn test_concurrent_redo_counts_once() {
    let client = ScriptedClient::gated(vec![extraction("Only summary.")], 2);
    let fx = fixture_with(client, LimitsConfig::default()).await;
    let call = upload(&fx, &["t.txt"]).await;
    fx.processor.process_call(call.id).await.unwrap();

    let (a, b) = tokio::join!(
        fx.processor.redo_call_summary(call.id),
        fx.processor.redo_call_summary(call.id)
    );
    let lost = match (a, b) {
        (Ok(_), Err(lost)) | (Err(lost), Ok(_)) => lost,
        other => panic!("expected exactly one redo to win, got {:?}", other),
    };
    assert!(matches!(lost, ServiceError::Conflict(_)));

    let stored = call::Entity::find_by_id(call.id)
        .one(&fx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.llm_refinement_count, 1);
    assert_eq!(stored.ai_summary.as_deref(), Some("Merged call summary."));
}
