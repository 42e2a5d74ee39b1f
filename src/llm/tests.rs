use super::*;
use crate::models::{PaymentCurrency, PaymentMethod, PaymentStatus};
use chrono::NaiveDate;

fn generator(mock: MockLlmClient) -> InsightGenerator {
    InsightGenerator::new(LlmConfig::default(), Arc::new(mock))
}

#[test]
fn test_parse_full_extraction() {
    let raw = r#"{
        "payment_status": "collected",
        "payment_amount": "$1,250.50",
        "payment_currency": "usd",
        "payment_date": "2024-03-15",
        "payment_method": "Credit Card",
        "ai_summary": "Customer paid the outstanding balance by card."
    }"#;

    let insight = extraction::parse_extraction(raw).unwrap();
    assert_eq!(insight.payment_status, PaymentStatus::Collected);
    assert_eq!(insight.payment_amount, Some(1250.50));
    assert_eq!(insight.payment_currency, PaymentCurrency::Usd);
    assert_eq!(
        insight.payment_date,
        NaiveDate::from_ymd_opt(2024, 3, 15)
    );
    assert_eq!(insight.payment_method, Some(PaymentMethod::CreditCard));
    assert_eq!(
        insight.ai_summary.as_deref(),
        Some("Customer paid the outstanding balance by card.")
    );
}

#[test]
fn test_parse_code_fenced_response() {
    let raw = "```json\n{\"payment_status\": \"Committed\", \"payment_amount\": 300, \"summary\": \"Promise to pay.\"}\n```";
    let insight = extraction::parse_extraction(raw).unwrap();
    assert_eq!(insight.payment_status, PaymentStatus::Committed);
    assert_eq!(insight.payment_amount, Some(300.0));
    assert_eq!(insight.ai_summary.as_deref(), Some("Promise to pay."));
}

#[test]
fn test_parse_tolerates_bad_fields() {
    let raw = r#"Here you go: {
        "payment_status": "Paid in full",
        "payment_amount": "about two hundred",
        "payment_currency": "CAD",
        "payment_date": "next Friday",
        "payment_method": "Other - Zelle",
        "summary_text": "Customer discussed options."
    }"#;

    let insight = extraction::parse_extraction(raw).unwrap();
    assert_eq!(insight.payment_status, PaymentStatus::Pending);
    assert_eq!(insight.payment_amount, None);
    assert_eq!(insight.payment_currency, PaymentCurrency::Other);
    assert_eq!(insight.payment_date, None);
    assert_eq!(insight.payment_method, Some(PaymentMethod::Other));
    assert_eq!(insight.ai_summary.as_deref(), Some("Customer discussed options."));
}

#[test]
fn test_parse_missing_currency_defaults_to_usd() {
    let insight = extraction::parse_extraction(r#"{"payment_amount": "₹ 4,000"}"#).unwrap();
    assert_eq!(insight.payment_currency, PaymentCurrency::Usd);
    assert_eq!(insight.payment_amount, Some(4000.0));
    assert_eq!(insight.ai_summary, None);
}

#[test]
fn test_parse_rejects_non_json() {
    assert!(extraction::parse_extraction("I could not find any payment details.").is_err());
    assert!(extraction::parse_extraction("[1, 2, 3]").is_err());
}

#[test]
fn test_prompt_requests() {
    let config = LlmConfig::default();
    let request = prompts::extraction_request("Agent: hello", &config);
    assert_eq!(request.kind, RequestKind::Extraction);
    assert_eq!(request.temperature, 0.0);
    assert_eq!(request.max_tokens, 1024);
    assert!(request.user_prompt.contains("Agent: hello"));

    let summaries = vec!["first".to_string(), "second".to_string()];
    let request = prompts::call_summary_request(&summaries, &config);
    assert_eq!(request.kind, RequestKind::CallSummary);
    assert_eq!(request.temperature, 0.2);
    assert!(request.user_prompt.contains("Transcript 1:\nfirst"));
    assert!(request.user_prompt.contains("Transcript 2:\nsecond"));

    let request = prompts::refinement_request("base", "expert", &config);
    assert_eq!(request.kind, RequestKind::Refinement);
    assert!(request.system_prompt.contains("refines summaries based on expert feedback"));
}

#[tokio::test]
async fn test_extract_insight_falls_back_on_llm_error() {
    let mut mock = MockLlmClient::new();
    mock.expect_generate_response()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("connection refused")));

    let insight = generator(mock).extract_insight("Agent: hello").await;
    assert_eq!(insight.payment_status, PaymentStatus::Pending);
    assert_eq!(insight.payment_amount, None);
    let summary = insight.ai_summary.unwrap();
    assert!(summary.starts_with("Error processing transcript: connection refused"));
    assert!(summary.ends_with("requires manual review."));
}

#[tokio::test]
async fn test_extract_insight_falls_back_on_malformed_json() {
    let mut mock = MockLlmClient::new();
    mock.expect_generate_response()
        .withf(|request| request.kind == RequestKind::Extraction)
        .times(1)
        .returning(|_| Ok("{\"payment_status\": \"Collected\",".to_string()));

    let insight = generator(mock).extract_insight("Agent: hello").await;
    assert_eq!(insight.payment_status, PaymentStatus::Pending);
    assert!(insight
        .ai_summary
        .unwrap()
        .starts_with("Error processing transcript:"));
}

#[tokio::test]
async fn test_summarize_call_fallbacks() {
    let mut mock = MockLlmClient::new();
    mock.expect_generate_response()
        .times(2)
        .returning(|_| Err(anyhow::anyhow!("timeout")));
    let generator = generator(mock);

    let single = generator.summarize_call(&["only one".to_string()]).await;
    assert_eq!(single, "Fallback AI summary: only one");

    let long = "x".repeat(150);
    let multi = generator
        .summarize_call(&[long.clone(), "short".to_string()])
        .await;
    assert_eq!(
        multi,
        format!(
            "Multiple transcript summary (error processing): [Transcript 1] {}... [Transcript 2] short...",
            "x".repeat(100)
        )
    );
}

#[tokio::test]
async fn test_refine_summary() {
    let mut mock = MockLlmClient::new();
    mock.expect_generate_response()
        .withf(|request| {
            request.kind == RequestKind::Refinement
                && request.user_prompt.contains("base text")
                && request.user_prompt.contains("expert text")
        })
        .times(1)
        .returning(|_| Ok("Merged paragraph.".to_string()));
    mock.expect_generate_response()
        .withf(|request| request.user_prompt.contains("other base"))
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("rate limited")));
    let generator = generator(mock);

    assert_eq!(
        generator.refine_summary("base text", "expert text").await,
        "Merged paragraph."
    );
    assert_eq!(
        generator.refine_summary("other base", "other").await,
        "Fallback refined summary: other base"
    );
}

#[test]
fn test_builder_requires_api_key() {
    let err = OpenAiClientBuilder::new().build().err().unwrap();
    assert!(err.to_string().contains("API key is required"));

    let client = OpenAiClientBuilder::new()
        .with_api_key("sk-test")
        .with_base_url("http://localhost:8080/v1")
        .with_model("gpt-4o-mini")
        .with_timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap();
    assert_eq!(client.model(), "gpt-4o-mini");
}

#[test]
fn test_from_config_rejects_unknown_provider() {
    let config = LlmConfig {
        provider: "bedrock".to_string(),
        ..Default::default()
    };
    assert!(OpenAiClientBuilder::from_config(&config).is_err());
}
