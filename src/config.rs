use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub database_url: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let llm_provider = env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".to_string());
        let llm_model =
            env::var("LLM_MODEL").unwrap_or_else(|_| default_model(&llm_provider).to_string());

        let config = Self {
            port: parse_var("APP_PORT", 8080)?,
            environment: env::var("APP_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            llm_provider,
            llm_model,
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            retry_max_attempts: parse_var("LLM_RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_var("LLM_RETRY_BASE_DELAY_MS", 1000)?),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 300)?),
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "research-report-service".to_string()),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
        };

        if config.retry_max_attempts == 0 {
            anyhow::bail!("LLM_RETRY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// API key for the configured provider, empty when unset.
    pub fn provider_api_key(&self) -> &str {
        let key = match self.llm_provider.as_str() {
            "openai" => &self.openai_api_key,
            "anthropic" => &self.anthropic_api_key,
            _ => &self.gemini_api_key,
        };
        key.as_deref().unwrap_or("")
    }
}

pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4.1-mini",
        "anthropic" => "claude-haiku-4-5-20251001",
        _ => "gemini-2.0-flash",
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
