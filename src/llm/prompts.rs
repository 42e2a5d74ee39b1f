use super::{ChatRequest, RequestKind, SUMMARY_DELIMITER};
use crate::config::LlmConfig;

const EXTRACTION_SYSTEM_PROMPT: &str = "You are an assistant that reads call center transcripts \
and extracts payment information as strict JSON. Respond with a single JSON object and nothing else.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are an assistant that writes concise, professional \
summaries of customer calls for a collections dashboard.";

const REFINEMENT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that refines summaries based on expert feedback.";

pub fn extraction_request(transcript_text: &str, config: &LlmConfig) -> ChatRequest {
    let user_prompt = format!(
        r#"Read the call transcript below and return a JSON object with these keys:

- "payment_status": one of "Prepaid", "Collected", "Committed", "Pending".
  Prepaid means the customer already paid before the call, Collected means payment was taken
  during the call, Committed means the customer promised to pay later, Pending means none of these.
- "payment_amount": the amount as a number without currency symbols, or null when not mentioned.
- "payment_currency": one of "USD", "INR", "EUR", "GBP", "JPY", "AUD", "Other". Use "USD" when unclear.
- "payment_date": the payment or promised payment date as YYYY-MM-DD, or null.
- "payment_method": one of "Credit Card", "Debit Card", "ACH", "Check", "Cash", "Wire Transfer",
  or "Other - <method>" for anything else; null when not mentioned.
- "ai_summary": two to four sentences describing the purpose and outcome of the call.

Transcript:
"""
{}
""""#,
        transcript_text
    );

    ChatRequest {
        kind: RequestKind::Extraction,
        system_prompt: EXTRACTION_SYSTEM_PROMPT.to_string(),
        user_prompt,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Builds the call-level summary prompt. More than one summary is presented as
/// numbered transcripts so the model merges them into a single narrative.
pub fn call_summary_request(summaries: &[String], config: &LlmConfig) -> ChatRequest {
    let joined = summaries.join(SUMMARY_DELIMITER);
    let user_prompt = if summaries.len() > 1 {
        let numbered = summaries
            .iter()
            .enumerate()
            .map(|(idx, summary)| format!("Transcript {}:\n{}", idx + 1, summary))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "The following summaries belong to transcripts of the same customer call, in order. \
Combine them into one coherent paragraph that covers the full conversation, the payment \
outcome and any follow-up actions. Do not repeat information.\n\n{}",
            numbered
        )
    } else {
        format!(
            "Rewrite the following call summary as one clear, professional paragraph covering the \
purpose of the call, the payment outcome and any follow-up actions.\n\n{}",
            joined
        )
    };

    ChatRequest {
        kind: RequestKind::CallSummary,
        system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
        user_prompt,
        temperature: config.summary_temperature,
        max_tokens: config.max_tokens,
    }
}

pub fn refinement_request(base_summary: &str, user_summary: &str, config: &LlmConfig) -> ChatRequest {
    let user_prompt = format!(
        "An AI produced the original summary below and a human expert supplied a corrected \
version. Merge them into one professional paragraph. Prefer the expert's facts wherever the two \
disagree and keep any details from the original that the expert did not contradict. Reply with \
the paragraph only.\n\nOriginal summary:\n{}\n\nExpert summary:\n{}",
        base_summary, user_summary
    );

    ChatRequest {
        kind: RequestKind::Refinement,
        system_prompt: REFINEMENT_SYSTEM_PROMPT.to_string(),
        user_prompt,
        temperature: 0.0,
        max_tokens: config.max_tokens,
    }
}
