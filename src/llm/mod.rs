pub mod anthropic;
pub mod client;
pub mod gemini;
pub mod openai;
pub mod retry;

use std::sync::Arc;

use thiserror::Error;

pub use client::LlmClient;
pub use retry::RetryPolicy;

/// Sampling parameters sent with every provider call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    /// Narrative synthesis: some creativity, bounded length.
    pub const REPORT: Self = Self {
        temperature: 0.7,
        top_k: 40,
        top_p: 0.95,
        max_output_tokens: 2048,
    };

    /// Document text extraction: deterministic, long output.
    pub const EXTRACTION: Self = Self {
        temperature: 0.0,
        top_k: 1,
        top_p: 1.0,
        max_output_tokens: 8192,
    };
}

/// Binary payload sent inline next to the prompt, base64 encoded.
#[derive(Debug, Clone)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub inline_data: Option<InlineData>,
    pub config: GenerationConfig,
    pub stage: String,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
    pub provider: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    Auth,
    InvalidRequest,
    Server,
    Timeout,
    Network,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Auth,
            400 | 404 | 413 | 422 => Self::InvalidRequest,
            408 | 504 => Self::Timeout,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Fallback for failures that never produced an HTTP status.
    pub fn from_message(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("rate limit") || msg.contains("429") || msg.contains("resource_exhausted")
        {
            Self::RateLimited
        } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline")
        {
            Self::Timeout
        } else if msg.contains("401")
            || msg.contains("403")
            || msg.contains("auth")
            || msg.contains("api key")
        {
            Self::Auth
        } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
            Self::InvalidRequest
        } else if msg.contains("500")
            || msg.contains("502")
            || msg.contains("503")
            || msg.contains("server")
        {
            Self::Server
        } else if msg.contains("connect")
            || msg.contains("dns")
            || msg.contains("network")
            || msg.contains("reset")
        {
            Self::Network
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limit",
            Self::Auth => "auth_error",
            Self::InvalidRequest => "invalid_request",
            Self::Server => "server_error",
            Self::Timeout => "timeout",
            Self::Network => "network_error",
            Self::Unknown => "unknown_error",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::from_status(status), message)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ProviderErrorKind::RateLimited
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if let Some(status) = err.status() {
            ProviderErrorKind::from_status(status.as_u16())
        } else if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_connect() {
            ProviderErrorKind::Network
        } else if err.is_decode() {
            ProviderErrorKind::Server
        } else {
            ProviderErrorKind::from_message(&err.to_string())
        };
        Self::new(kind, err.to_string())
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;
    fn name(&self) -> &str;
    /// Host and port reported on `gen_ai` spans.
    fn server(&self) -> (&str, u16);
}

/// Builds the provider selected by `LLM_PROVIDER`.
pub fn provider_from_config(config: &crate::config::Config) -> Arc<dyn Provider> {
    let api_key = config.provider_api_key();
    match config.llm_provider.as_str() {
        "openai" => Arc::new(openai::OpenAIProvider::new(api_key)),
        "anthropic" => Arc::new(anthropic::AnthropicProvider::new(api_key)),
        _ => Arc::new(gemini::GeminiProvider::new(api_key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_status() {
        let cases = [
            (429, ProviderErrorKind::RateLimited),
            (401, ProviderErrorKind::Auth),
            (403, ProviderErrorKind::Auth),
            (400, ProviderErrorKind::InvalidRequest),
            (422, ProviderErrorKind::InvalidRequest),
            (504, ProviderErrorKind::Timeout),
            (500, ProviderErrorKind::Server),
            (503, ProviderErrorKind::Server),
            (302, ProviderErrorKind::Unknown),
        ];
        for (status, expected) in cases {
            assert_eq!(ProviderErrorKind::from_status(status), expected, "{status}");
        }
    }

    #[test]
    fn test_kind_from_message() {
        let cases = vec![
            ("rate limit exceeded", ProviderErrorKind::RateLimited),
            ("status 429: too many requests", ProviderErrorKind::RateLimited),
            ("RESOURCE_EXHAUSTED: quota", ProviderErrorKind::RateLimited),
            ("request timed out", ProviderErrorKind::Timeout),
            ("invalid api key", ProviderErrorKind::Auth),
            ("422 unprocessable entity", ProviderErrorKind::InvalidRequest),
            ("502 bad gateway", ProviderErrorKind::Server),
            ("connection refused", ProviderErrorKind::Network),
            ("something unexpected", ProviderErrorKind::Unknown),
        ];
        for (msg, expected) in cases {
            assert_eq!(
                ProviderErrorKind::from_message(msg),
                expected,
                "from_message({msg:?})"
            );
        }
    }

    #[test]
    fn test_generation_presets() {
        assert_eq!(GenerationConfig::REPORT.max_output_tokens, 2048);
        assert!((GenerationConfig::REPORT.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(GenerationConfig::EXTRACTION.top_k, 1);
        assert_eq!(GenerationConfig::EXTRACTION.temperature, 0.0);
        assert_eq!(GenerationConfig::EXTRACTION.max_output_tokens, 8192);
    }

    #[test]
    fn test_provider_error_display_is_message() {
        let err = ProviderError::from_status(429, "quota exceeded");
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
