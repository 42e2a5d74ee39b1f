use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;

pub mod extraction;
pub mod prompts;
#[cfg(test)]
mod tests;

pub use extraction::ExtractedInsight;

/// Placeholder call summary used when no transcript produced a summary.
pub const NO_INSIGHTS_SUMMARY: &str = "No transcript insights available.";
/// Separator used when storing the per-transcript summaries on the call.
pub const SUMMARY_DELIMITER: &str = " ||| ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Extraction,
    CallSummary,
    Refinement,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction => f.write_str("extraction"),
            Self::CallSummary => f.write_str("call_summary"),
            Self::Refinement => f.write_str("refinement"),
        }
    }
}

// A single system + user prompt exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub kind: RequestKind,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_response(&self, request: &ChatRequest) -> Result<String>;
}

// Builder for OpenAI Client
pub struct OpenAiClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    org_id: Option<String>,
    model: String,
    timeout: Option<Duration>,
}

impl Default for OpenAiClientBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            org_id: None,
            model: LlmConfig::default().model,
            timeout: None,
        }
    }
}

impl OpenAiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if !config.provider.eq_ignore_ascii_case("openai") {
            anyhow::bail!("unsupported LLM provider: {}", config.provider);
        }
        let mut builder = Self::new().with_model(config.model.clone());
        if let Some(api_key) = &config.api_key {
            builder = builder.with_api_key(api_key.clone());
        }
        if let Some(base_url) = &config.base_url {
            builder = builder.with_base_url(base_url.clone());
        }
        if let Some(org_id) = &config.org_id {
            builder = builder.with_org_id(org_id.clone());
        }
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.with_timeout(Duration::from_secs(secs));
        }
        Ok(builder)
    }

    pub fn build(self) -> Result<OpenAiClient> {
        let api_key = self
            .api_key
            .ok_or_else(|| anyhow::anyhow!("API key is required"))?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);

        if let Some(base_url) = self.base_url {
            config = config.with_api_base(base_url);
        }

        if let Some(org_id) = self.org_id {
            config = config.with_org_id(org_id);
        }

        let mut client = Client::with_config(config);
        if let Some(timeout) = self.timeout {
            let http_client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("failed to build LLM http client")?;
            client = client.with_http_client(http_client);
        }

        Ok(OpenAiClient {
            client,
            model: self.model,
        })
    }
}

// OpenAI LLM client implementation
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(request: &ChatRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(&*request.system_prompt)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(&*request.user_prompt)
                .build()?
                .into(),
        ])
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_response(&self, request: &ChatRequest) -> Result<String> {
        let messages = Self::build_messages(request)?;
        let chat_request = CreateChatCompletionRequestArgs::default()
            .max_tokens(request.max_tokens)
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .build()?;

        let started = std::time::Instant::now();
        let response = self.client.chat().create(chat_request).await?;
        debug!(
            kind = %request.kind,
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "llm response received"
        );

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM returned no content"))?;
        Ok(content.trim().to_string())
    }
}

/// Prompts the model for every insight operation and turns failures into
/// deterministic fallback values.
pub struct InsightGenerator {
    config: LlmConfig,
    client: Arc<dyn LlmClient>,
}

impl InsightGenerator {
    pub fn new(config: LlmConfig, client: Arc<dyn LlmClient>) -> Self {
        Self { config, client }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = OpenAiClientBuilder::from_config(config)?.build()?;
        info!(model = %client.model(), "LLM client initialized");
        Ok(Self::new(config.clone(), Arc::new(client)))
    }

    /// Extracts payment details and a summary from one transcript. Never fails:
    /// any error yields the default pending insight.
    pub async fn extract_insight(&self, transcript_text: &str) -> ExtractedInsight {
        let request = prompts::extraction_request(transcript_text, &self.config);
        let raw = match self.client.generate_response(&request).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("transcript extraction failed: {:#}", err);
                return ExtractedInsight::fallback(&format!("{:#}", err));
            }
        };

        match extraction::parse_extraction(&raw) {
            Ok(insight) => insight,
            Err(err) => {
                let preview = raw.chars().take(160).collect::<String>();
                warn!(preview = %preview, "failed to parse extraction response: {:#}", err);
                ExtractedInsight::fallback(&format!("{:#}", err))
            }
        }
    }

    /// Merges per-transcript summaries into one call-level summary.
    pub async fn summarize_call(&self, summaries: &[String]) -> String {
        let request = prompts::call_summary_request(summaries, &self.config);
        match self.client.generate_response(&request).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                warn!("call summary response was empty");
                call_summary_fallback(summaries)
            }
            Err(err) => {
                warn!(count = summaries.len(), "call summary failed: {:#}", err);
                call_summary_fallback(summaries)
            }
        }
    }

    /// Merges a user-edited summary into the base summary.
    pub async fn refine_summary(&self, base_summary: &str, user_summary: &str) -> String {
        let request = prompts::refinement_request(base_summary, user_summary, &self.config);
        match self.client.generate_response(&request).await {
            Ok(refined) if !refined.trim().is_empty() => refined,
            Ok(_) => {
                warn!("refinement response was empty");
                format!("Fallback refined summary: {}", base_summary)
            }
            Err(err) => {
                warn!("summary refinement failed: {:#}", err);
                format!("Fallback refined summary: {}", base_summary)
            }
        }
    }
}

pub fn call_summary_fallback(summaries: &[String]) -> String {
    match summaries {
        [] => NO_INSIGHTS_SUMMARY.to_string(),
        [single] => format!("Fallback AI summary: {}", single),
        many => {
            let parts = many
                .iter()
                .enumerate()
                .map(|(idx, summary)| {
                    let head = summary.chars().take(100).collect::<String>();
                    format!("[Transcript {}] {}...", idx + 1, head)
                })
                .collect::<Vec<_>>();
            format!(
                "Multiple transcript summary (error processing): {}",
                parts.join(" ")
            )
        }
    }
}
