pub mod documents;
pub mod health;
pub mod reports;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/reports", post(reports::create_report))
        .route("/api/reports/export", post(reports::export_report))
        .route(
            "/api/documents",
            get(documents::list_documents).post(documents::create_document),
        )
        .route("/api/documents/extract", post(documents::extract_document))
        .route("/api/documents/{id}", delete(documents::delete_document))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::llm::client::tests::{FakeProvider, client_with};

    fn test_config() -> Config {
        Config {
            port: 0,
            environment: "test".to_string(),
            database_url: "postgres://postgres@localhost/research_reports_test".to_string(),
            llm_provider: "fake".to_string(),
            llm_model: "test-model".to_string(),
            gemini_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
            otel_service_name: "research-report-service-test".to_string(),
            otel_exporter_endpoint: "http://localhost:4317".to_string(),
        }
    }

    /// App wired to a scripted provider. The pool never connects unless a
    /// handler actually queries it.
    pub(crate) fn test_app(provider: Arc<FakeProvider>) -> Router {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let state = AppState {
            pool,
            llm_client: Arc::new(client_with(provider, config.retry_base_delay)),
            config,
        };
        crate::app(state)
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) async fn send(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    pub(crate) async fn send_json(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, req).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(Arc::new(FakeProvider::new(vec![])));
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_json(app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "research-report-service");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_app(Arc::new(FakeProvider::new(vec![])));
        let req = Request::builder()
            .uri("/api/nowhere")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
