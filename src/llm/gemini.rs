use serde::{Deserialize, Serialize};

use super::{GenerateRequest, GenerateResponse, Provider, ProviderError, ProviderErrorKind};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const SERVER_ADDRESS: &str = "generativelanguage.googleapis.com";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: Blob },
}

#[derive(Serialize)]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
    status: Option<String>,
}

fn build_request(req: &GenerateRequest) -> GeminiRequest {
    let mut parts = vec![Part::Text {
        text: req.prompt.clone(),
    }];
    if let Some(inline) = &req.inline_data {
        parts.push(Part::InlineData {
            inline_data: Blob {
                mime_type: inline.mime_type.clone(),
                data: inline.data.clone(),
            },
        });
    }

    GeminiRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GeminiGenerationConfig {
            temperature: req.config.temperature,
            top_k: req.config.top_k,
            top_p: req.config.top_p,
            max_output_tokens: req.config.max_output_tokens,
        },
    }
}

fn parse_response(resp: GeminiResponse, model: &str) -> Result<GenerateResponse, ProviderError> {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ProviderError::new(
            ProviderErrorKind::InvalidRequest,
            format!("Gemini returned no content: {reason}"),
        ));
    };

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let (input_tokens, output_tokens) = resp
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(GenerateResponse {
        content,
        model: resp.model_version.unwrap_or_else(|| model.to_string()),
        input_tokens,
        output_tokens,
        finish_reason: candidate
            .finish_reason
            .map(|r| r.to_lowercase())
            .unwrap_or_default(),
        provider: String::new(),
    })
}

fn error_from_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(err) => {
            let mut provider_err = ProviderError::from_status(
                status,
                format!("Gemini API error ({status}): {}", err.error.message),
            );
            if err.error.status.as_deref() == Some("RESOURCE_EXHAUSTED") {
                provider_err.kind = ProviderErrorKind::RateLimited;
            }
            provider_err
        }
        Err(_) => ProviderError::from_status(status, format!("Gemini API error ({status}): {body}")),
    }
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(&req.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&build_request(req))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &body));
        }

        let resp: GeminiResponse = response.json().await?;
        parse_response(resp, &req.model)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn server(&self) -> (&str, u16) {
        (SERVER_ADDRESS, 443)
    }
}
