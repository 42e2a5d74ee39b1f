use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub http_addr: String,
    pub environment: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub database_url: String,
    pub api_prefix: String,
    pub cors_origins: Option<Vec<String>>,
    pub max_upload_bytes: usize,
    pub limits: LimitsConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_transcripts_per_call: usize,
    pub max_transcript_length: usize,
    pub max_refinement_count: i32,
    pub max_call_redo_count: i32,
}

// Configuration for the language model backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub org_id: Option<String>,
    pub temperature: f32,
    pub summary_temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "staging" => Some(Self::Staging),
            "production" | "prod" => Some(Self::Production),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// Strict lookup used by the health check: only the canonical lowercase
    /// names of deployed environments are accepted.
    pub fn deployed(value: &str) -> Option<Self> {
        match value {
            "development" => Some(Self::Development),
            "staging" => Some(Self::Staging),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Test => "Test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_transcripts_per_call: 4,
            max_transcript_length: 100_000,
            max_refinement_count: 5,
            max_call_redo_count: 20,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            base_url: None,
            org_id: None,
            temperature: 0.0,
            summary_temperature: 0.2,
            max_tokens: 1024,
            request_timeout_secs: Some(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8000".to_string(),
            environment: "development".to_string(),
            log_level: Some("info".to_string()),
            log_file: None,
            database_url: "sqlite://./call_insights.db?mode=rwc".to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            cors_origins: None,
            max_upload_bytes: 10 * 1024 * 1024,
            limits: LimitsConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parse config {}", path))?;
        Ok(config)
    }

    /// Applies the process environment on top of the loaded values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = non_empty("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = non_empty("HTTP_ADDR") {
            self.http_addr = v;
        }
        if let Some(v) = non_empty("LLM") {
            self.llm.provider = v;
        }
        if let Some(v) = non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = non_empty("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = non_empty("LLM_TEMPERATURE").and_then(|v| v.parse::<f32>().ok()) {
            self.llm.temperature = v;
        }
        if let Some(v) = non_empty("OPENAI_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if self.cors_origins.is_none()
            && Environment::parse(&self.environment) == Some(Environment::Production)
        {
            self.cors_origins = Some(non_empty("FRONTEND_URL").into_iter().collect());
        }
    }

    pub fn environment(&self) -> Option<Environment> {
        Environment::parse(&self.environment)
    }

    pub fn is_production(&self) -> bool {
        self.environment() == Some(Environment::Production)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.environment().is_none() {
            anyhow::bail!("unknown environment: {}", self.environment);
        }
        if !self.llm.provider.eq_ignore_ascii_case("openai") {
            anyhow::bail!("unsupported LLM provider: {}", self.llm.provider);
        }
        if self.limits.max_transcripts_per_call == 0 {
            anyhow::bail!("limits.max_transcripts_per_call must be at least 1");
        }
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            anyhow::bail!("api_prefix must start with '/': {}", self.api_prefix);
        }
        self.http_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid http_addr {}", self.http_addr))?;
        Ok(())
    }
}
