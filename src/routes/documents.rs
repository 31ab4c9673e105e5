use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::db::documents::{self, DocumentRow};
use crate::error::{AppError, AppResult};

const DEFAULT_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Deserialize)]
pub struct CreateDocumentBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl CreateDocumentBody {
    fn validated(self) -> AppResult<(String, String)> {
        match (self.name, self.content) {
            (Some(name), Some(content)) if !name.trim().is_empty() && !content.is_empty() => {
                Ok((name.trim().to_string(), content))
            }
            _ => Err(AppError::Validation(
                "name and content are required".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedDocument {
    pub id: i64,
    pub name: String,
}

pub async fn list_documents(State(state): State<AppState>) -> AppResult<Json<Vec<DocumentRow>>> {
    let rows = documents::list_documents(&state.pool).await?;
    Ok(Json(rows))
}

pub async fn create_document(
    State(state): State<AppState>,
    Json(body): Json<CreateDocumentBody>,
) -> AppResult<(StatusCode, Json<CreatedDocument>)> {
    let (name, content) = body.validated()?;
    let row = documents::save_document(&state.pool, &name, &content).await?;

    tracing::info!(document.id = row.id, document.name = %row.name, "document saved");

    Ok((
        StatusCode::CREATED,
        Json(CreatedDocument {
            id: row.id,
            name: row.name,
        }),
    ))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !documents::delete_document(&state.pool, id).await? {
        return Err(AppError::NotFound(format!("Document {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ExtractBody {
    /// Base64 document bytes, optionally as a data URL.
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractedText {
    pub text: String,
}

pub async fn extract_document(
    State(state): State<AppState>,
    Json(body): Json<ExtractBody>,
) -> AppResult<Json<ExtractedText>> {
    let mime_type = body.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
    let text = state.llm_client.extract_text(&body.data, mime_type).await?;
    Ok(Json(ExtractedText { text }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::llm::client::tests::FakeProvider;
    use crate::llm::{GenerationConfig, ProviderError};
    use crate::routes::tests::{json_request, send_json, test_app};

    #[test]
    fn test_create_body_validation() {
        let ok: CreateDocumentBody =
            serde_json::from_value(json!({"name": " notes.txt ", "content": "text"})).unwrap();
        assert_eq!(
            ok.validated().unwrap(),
            ("notes.txt".to_string(), "text".to_string())
        );

        for raw in [
            json!({}),
            json!({"name": "a.txt"}),
            json!({"content": "text"}),
            json!({"name": "  ", "content": "text"}),
            json!({"name": "a.txt", "content": ""}),
        ] {
            let body: CreateDocumentBody = serde_json::from_value(raw.clone()).unwrap();
            assert!(body.validated().is_err(), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_create_without_content_is_400() {
        let app = test_app(Arc::new(FakeProvider::new(vec![])));
        let req = json_request("POST", "/api/documents", &json!({"name": "a.txt"}));

        let (status, body) = send_json(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "name and content are required");
    }

    #[tokio::test]
    async fn test_extract_document() {
        let provider = Arc::new(FakeProvider::new(vec![Ok("Quarterly revenue rose.".to_string())]));
        let app = test_app(provider.clone());
        let req = json_request(
            "POST",
            "/api/documents/extract",
            &json!({"data": "data:application/pdf;base64,JVBERi0xLjQK"}),
        );

        let (status, body) = send_json(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Quarterly revenue rose.");

        let requests = provider.requests.lock().unwrap();
        let inline = requests[0].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "application/pdf");
        assert_eq!(inline.data, "JVBERi0xLjQK");
        assert_eq!(requests[0].config, GenerationConfig::EXTRACTION);
    }

    #[tokio::test]
    async fn test_extract_invalid_payload_is_400() {
        let provider = Arc::new(FakeProvider::new(vec![]));
        let app = test_app(provider.clone());
        let req = json_request("POST", "/api/documents/extract", &json!({"data": "%%%"}));

        let (status, _) = send_json(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_extract_does_not_retry_rate_limits() {
        let provider = Arc::new(FakeProvider::new(vec![
            Err(ProviderError::from_status(429, "quota")),
            Ok("unused".to_string()),
        ]));
        let app = test_app(provider.clone());
        let req = json_request(
            "POST",
            "/api/documents/extract",
            &json!({"data": "JVBERi0xLjQK", "mime_type": "application/pdf"}),
        );

        let (status, body) = send_json(app, req).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to extract text from document");
        assert_eq!(provider.calls(), 1);
    }
}
