use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;

use crate::models::{PaymentCurrency, PaymentMethod, PaymentStatus};

/// Structured result of running the extraction prompt over one transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedInsight {
    pub payment_status: PaymentStatus,
    pub payment_amount: Option<f64>,
    pub payment_currency: PaymentCurrency,
    pub payment_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub comments: Option<String>,
    pub ai_summary: Option<String>,
}

impl ExtractedInsight {
    pub fn fallback(reason: &str) -> Self {
        Self {
            payment_status: PaymentStatus::Pending,
            payment_amount: None,
            payment_currency: PaymentCurrency::Usd,
            payment_date: None,
            payment_method: None,
            comments: None,
            ai_summary: Some(format!(
                "Error processing transcript: {}. This is a fallback response and requires manual review.",
                reason
            )),
        }
    }
}

/// Parses the model's reply. Fails only when no JSON object can be found;
/// individual fields that do not parse fall back to their defaults.
pub fn parse_extraction(raw: &str) -> Result<ExtractedInsight> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .or_else(|_| {
            // the model sometimes wraps the object in prose
            let start = body.find('{').context("no JSON object in response")?;
            let end = body.rfind('}').context("no JSON object in response")?;
            anyhow::ensure!(start < end, "no JSON object in response");
            serde_json::from_str(&body[start..=end]).context("invalid JSON in response")
        })
        .context("failed to decode extraction response")?;

    let object = value
        .as_object()
        .context("extraction response is not a JSON object")?;

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
    };

    let payment_status = text("payment_status")
        .and_then(PaymentStatus::from_label)
        .unwrap_or_default();

    let payment_amount = object.get("payment_amount").and_then(parse_amount);

    let payment_currency = match text("payment_currency") {
        Some(code) => PaymentCurrency::from_code(code).unwrap_or(PaymentCurrency::Other),
        None => PaymentCurrency::Usd,
    };

    let payment_date = text("payment_date")
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

    let payment_method = text("payment_method").and_then(PaymentMethod::from_label);

    let ai_summary = text("ai_summary")
        .or_else(|| text("summary_text"))
        .or_else(|| text("summary"))
        .map(str::to_string);

    let comments = text("comments").map(str::to_string);

    Ok(ExtractedInsight {
        payment_status,
        payment_amount,
        payment_currency,
        payment_date,
        payment_method,
        comments,
        ai_summary,
    })
}

fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | '₹' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    amount.filter(|amount| amount.is_finite())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
