use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use opentelemetry::KeyValue;
use thiserror::Error;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::retry::{GenerationError, RetryPolicy, RetryState};
use super::{
    GenerateRequest, GenerateResponse, GenerationConfig, InlineData, Provider, ProviderError,
};
use crate::pipeline::prompt;
use crate::pipeline::sanitize::SanitizedSource;
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT, GEN_AI_TOKEN_USAGE,
};

const EXTRACTION_PROMPT: &str = "\nThis is a base64-encoded document. Please extract all the text content from this document.\n\
Return ONLY the extracted text, formatted in a clean, readable way.\n\
Do not include any explanations, introductions, or analysis.\n";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid document payload: {0}")]
    InvalidPayload(String),

    #[error("failed to extract text from document: {0}")]
    Provider(#[from] ProviderError),
}

pub struct LlmClient {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            model: model.into(),
            policy,
        }
    }

    pub async fn generate_once(
        &self,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        let provider_name = self.provider.name().to_string();
        let (server_addr, server_port) = self.provider.server();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = %server_addr,
            server.port = i64::from(server_port),
            gen_ai.request.temperature = req.config.temperature,
            gen_ai.request.top_k = i64::from(req.config.top_k),
            gen_ai.request.top_p = req.config.top_p,
            gen_ai.request.max_tokens = i64::from(req.config.max_output_tokens),
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        {
            let mut user_event_attrs =
                vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))];
            if let Some(inline) = &req.inline_data {
                user_event_attrs.push(KeyValue::new(
                    "gen_ai.input.mime_type",
                    inline.mime_type.clone(),
                ));
            }
            span.add_event("gen_ai.user.message", user_event_attrs);
        }

        let result = self.provider.generate(req).instrument(span.clone()).await;

        let duration = start.elapsed().as_secs_f64();
        let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.clone());
        let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());
        let stage_kv = KeyValue::new("report.stage", req.stage.clone());

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name;

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", i64::from(resp.input_tokens));
                span.record("gen_ai.usage.output_tokens", i64::from(resp.output_tokens));
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION
                    .record(duration, &[op_kv, provider_kv, model_kv, stage_kv]);

                Ok(resp)
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", err.kind.as_str());

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        provider_kv,
                        model_kv,
                        stage_kv,
                        KeyValue::new("error.type", err.kind.as_str()),
                    ],
                );

                Err(err)
            }
        }
    }

    /// Runs `req` through the retry state machine.
    pub async fn generate_with_retry(
        &self,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, GenerationError> {
        let mut state = self.policy.start();

        loop {
            state = match state {
                RetryState::Attempting(attempt) => {
                    let outcome = self.generate_once(req).await;
                    if let Err(err) = &outcome {
                        tracing::warn!(
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            provider = self.provider.name(),
                            model = %req.model,
                            error.type = err.kind.as_str(),
                            error = %err,
                            "LLM call failed"
                        );
                    }
                    self.policy.on_outcome(attempt, outcome)
                }
                RetryState::Backoff {
                    attempt,
                    delay,
                    error,
                } => {
                    tracing::debug!(attempt, delay = ?delay, "rate limited, backing off");
                    tokio::time::sleep(delay).await;

                    let next = self.policy.after_backoff(attempt, error);
                    if matches!(next, RetryState::Attempting(_)) {
                        GEN_AI_RETRY_COUNT.add(
                            1,
                            &[
                                KeyValue::new("gen_ai.provider.name", self.provider.name().to_string()),
                                KeyValue::new("gen_ai.request.model", req.model.clone()),
                            ],
                        );
                    }
                    next
                }
                RetryState::Succeeded(resp) => return Ok(resp),
                RetryState::Failed(err) => return Err(err),
            };
        }
    }

    /// Composes the report prompt from sanitized sources and generates the
    /// report text with the rate-limit retry policy.
    pub async fn generate_report(
        &self,
        query: &str,
        sources: &[SanitizedSource],
        instruction_template: &str,
    ) -> Result<GenerateResponse, GenerationError> {
        let req = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt::compose(query, instruction_template, sources),
            inline_data: None,
            config: GenerationConfig::REPORT,
            stage: "generate".to_string(),
        };

        self.generate_with_retry(&req).await
    }

    /// Single-shot text extraction from a base64-encoded document.
    #[tracing::instrument(
        name = "pipeline_stage extract",
        skip(self, encoded_document),
        fields(pipeline.stage = "extract", document.bytes, extract.chars)
    )]
    pub async fn extract_text(
        &self,
        encoded_document: &str,
        mime_type: &str,
    ) -> Result<String, ExtractionError> {
        let data = normalize_payload(encoded_document)?;
        let span = tracing::Span::current();

        let req = GenerateRequest {
            model: self.model.clone(),
            prompt: EXTRACTION_PROMPT.to_string(),
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data,
            }),
            config: GenerationConfig::EXTRACTION,
            stage: "extract".to_string(),
        };

        let resp = self.generate_once(&req).await.inspect_err(|err| {
            tracing::error!(error = %err, error.type = err.kind.as_str(), "document extraction failed");
        })?;

        span.record("extract.chars", resp.content.chars().count());
        Ok(resp.content)
    }
}

/// Strips an optional data-URL prefix and whitespace, then checks the payload
/// decodes as standard base64.
fn normalize_payload(encoded: &str) -> Result<String, ExtractionError> {
    let trimmed = encoded.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if compact.is_empty() {
        return Err(ExtractionError::InvalidPayload(
            "document payload is empty".into(),
        ));
    }

    let decoded = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ExtractionError::InvalidPayload(format!("not valid base64: {e}")))?;
    tracing::Span::current().record("document.bytes", decoded.len());

    Ok(compact)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::llm::ProviderErrorKind;

    /// Replays scripted outcomes and records every request it receives.
    pub(crate) struct FakeProvider {
        outcomes: Mutex<VecDeque<Result<String, ProviderError>>>,
        pub calls: AtomicU32,
        pub requests: Mutex<Vec<GenerateRequest>>,
    }

    impl FakeProvider {
        pub(crate) fn new(outcomes: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Provider for FakeProvider {
        async fn generate(
            &self,
            req: &GenerateRequest,
        ) -> Result<GenerateResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(req.clone());
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::new(ProviderErrorKind::Unknown, "script exhausted")));
            next.map(|content| GenerateResponse {
                content,
                model: req.model.clone(),
                input_tokens: 10,
                output_tokens: 20,
                finish_reason: "stop".to_string(),
                provider: String::new(),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn server(&self) -> (&str, u16) {
            ("localhost", 0)
        }
    }

    pub(crate) fn client_with(
        provider: Arc<FakeProvider>,
        base_delay: Duration,
    ) -> LlmClient {
        LlmClient::new(provider, "test-model", RetryPolicy::new(3, base_delay))
    }

    fn rate_limited() -> ProviderError {
        ProviderError::from_status(429, "Resource has been exhausted")
    }

    fn sources() -> Vec<SanitizedSource> {
        vec![SanitizedSource {
            position: 1,
            text: "Rust is a systems language.".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_succeeds_after_rate_limits() {
        let provider = Arc::new(FakeProvider::new(vec![
            Err(rate_limited()),
            Ok("the report".to_string()),
        ]));
        let client = client_with(provider.clone(), Duration::from_millis(1));

        let resp = client
            .generate_report("rust", &sources(), "Summarize.")
            .await
            .unwrap();

        assert_eq!(resp.content, "the report");
        assert_eq!(resp.provider, "fake");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_three_rate_limits_exhaust_with_linear_backoff() {
        let provider = Arc::new(FakeProvider::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Err(rate_limited()),
            Ok("never reached".to_string()),
        ]));
        let base = Duration::from_millis(10);
        let client = client_with(provider.clone(), base);

        let start = Instant::now();
        let err = client
            .generate_report("rust", &sources(), "Summarize.")
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(provider.calls(), 3);
        assert!(matches!(err, GenerationError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("Resource has been exhausted"));
        assert!(elapsed >= base * 6, "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_stops_immediately() {
        let provider = Arc::new(FakeProvider::new(vec![
            Err(ProviderError::from_status(401, "API key not valid")),
            Ok("never reached".to_string()),
        ]));
        let client = client_with(provider.clone(), Duration::from_millis(1));

        let err = client
            .generate_report("rust", &sources(), "Summarize.")
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 1);
        match err {
            GenerationError::NonRetryable { attempt, source } => {
                assert_eq!(attempt, 1);
                assert_eq!(source.kind, ProviderErrorKind::Auth);
            }
            other => panic!("expected non-retryable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_report_request_uses_report_preset() {
        let provider = Arc::new(FakeProvider::new(vec![Ok("r".to_string())]));
        let client = client_with(provider.clone(), Duration::ZERO);

        client
            .generate_report("rust", &sources(), "Summarize.")
            .await
            .unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].config, GenerationConfig::REPORT);
        assert_eq!(requests[0].model, "test-model");
        assert!(requests[0].inline_data.is_none());
        assert!(requests[0].prompt.contains("Source 1:\nRust is a systems language."));
    }

    #[tokio::test]
    async fn test_extract_text_sends_inline_payload_once() {
        let provider = Arc::new(FakeProvider::new(vec![
            Err(rate_limited()),
            Ok("extracted".to_string()),
        ]));
        let client = client_with(provider.clone(), Duration::ZERO);
        let encoded = STANDARD.encode(b"%PDF-1.4 fake");

        let err = client
            .extract_text(&encoded, "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Provider(_)));
        assert_eq!(provider.calls(), 1);

        let text = client
            .extract_text(&format!("data:application/pdf;base64,{encoded}"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(text, "extracted");

        let requests = provider.requests.lock().unwrap();
        let inline = requests[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "application/pdf");
        assert_eq!(inline.data, encoded);
        assert_eq!(requests[1].config, GenerationConfig::EXTRACTION);
    }

    #[tokio::test]
    async fn test_extract_text_rejects_bad_payload_without_calling_provider() {
        let provider = Arc::new(FakeProvider::new(vec![Ok("x".to_string())]));
        let client = client_with(provider.clone(), Duration::ZERO);

        let empty = client.extract_text("   ", "application/pdf").await;
        assert!(matches!(empty, Err(ExtractionError::InvalidPayload(_))));

        let garbage = client.extract_text("not*base64!", "application/pdf").await;
        assert!(matches!(garbage, Err(ExtractionError::InvalidPayload(_))));

        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let result = truncate("hé世界!", 3);
        assert!(result.len() <= 3);
        assert!(result.is_char_boundary(result.len()));
        assert_eq!(truncate("hello", 10), "hello");
    }
}
