use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{GenerateRequest, GenerateResponse, Provider, ProviderError, ProviderErrorKind};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_k: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Document { source: DocumentSource },
    Text { text: String },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: String,
}

fn build_request(req: &GenerateRequest) -> AnthropicRequest {
    let mut content = Vec::with_capacity(2);
    if let Some(inline) = &req.inline_data {
        content.push(ContentBlock::Document {
            source: DocumentSource {
                source_type: "base64",
                media_type: inline.mime_type.clone(),
                data: inline.data.clone(),
            },
        });
    }
    content.push(ContentBlock::Text {
        text: req.prompt.clone(),
    });

    AnthropicRequest {
        model: req.model.clone(),
        max_tokens: req.config.max_output_tokens,
        temperature: req.config.temperature,
        top_k: req.config.top_k,
        messages: vec![AnthropicMessage {
            role: "user",
            content,
        }],
    }
}

fn error_from_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<AnthropicError>(body) {
        Ok(err) => {
            let mut provider_err = ProviderError::from_status(
                status,
                format!("Anthropic API error ({status}): {}", err.error.message),
            );
            if err.error.error_type.as_deref() == Some("overloaded_error") {
                provider_err.kind = ProviderErrorKind::Server;
            }
            provider_err
        }
        Err(_) => {
            ProviderError::from_status(status, format!("Anthropic API error ({status}): {body}"))
        }
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                ProviderError::new(ProviderErrorKind::Auth, format!("invalid API key header: {e}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(MESSAGES_URL)
            .headers(headers)
            .json(&build_request(req))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &error_body));
        }

        let resp: AnthropicResponse = response.json().await?;

        let content = resp
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerateResponse {
            content,
            model: resp.model,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            finish_reason: resp.stop_reason.unwrap_or_default(),
            provider: String::new(),
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn server(&self) -> (&str, u16) {
        ("api.anthropic.com", 443)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationConfig, InlineData};

    #[test]
    fn test_document_block_precedes_prompt() {
        let req = GenerateRequest {
            model: "claude-sonnet-4-5".to_string(),
            prompt: "Extract the text".to_string(),
            inline_data: Some(InlineData {
                mime_type: "application/pdf".to_string(),
                data: "JVBERi0=".to_string(),
            }),
            config: GenerationConfig::EXTRACTION,
            stage: "extract".to_string(),
        };
        let body = serde_json::to_value(build_request(&req)).unwrap();
        let content = &body["messages"][0]["content"];

        assert_eq!(content[0]["type"], "document");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "application/pdf");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "Extract the text");
        assert_eq!(body["max_tokens"], 8192);
    }

    #[test]
    fn test_error_mapping() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Number of requests exceeded"}}"#;
        let err = error_from_body(429, body);
        assert!(err.is_rate_limited());
        assert!(err.message.contains("Number of requests exceeded"));

        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_from_body(529, body).kind, ProviderErrorKind::Server);

        assert_eq!(error_from_body(401, "nope").kind, ProviderErrorKind::Auth);
    }
}
