// Browser form and its JSON API
pub mod api;
pub mod render;

pub mod server {
    use axum::{
        extract::DefaultBodyLimit,
        response::Html,
        routing::{get, post, put},
        Router,
    };
    use std::sync::Arc;

    use super::api;
    use crate::handlers::SessionRegistry;

    pub struct AppState {
        pub registry: Arc<SessionRegistry>,
    }

    pub fn create_router(registry: Arc<SessionRegistry>, max_upload_bytes: usize) -> Router {
        let state = Arc::new(AppState { registry });

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_check))
            .route("/api/sessions", post(api::create_session))
            .route(
                "/api/sessions/:id",
                get(api::get_session).delete(api::delete_session),
            )
            .route(
                "/api/sessions/:id/image",
                post(api::upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
            )
            .route("/api/sessions/:id/analyze", post(api::analyze))
            .route("/api/sessions/:id/inputs", put(api::update_inputs))
            .route("/api/sessions/:id/personalize", post(api::personalize))
            .route("/api/sessions/:id/clear", post(api::clear))
            .with_state(state)
    }

    async fn root_handler() -> Html<&'static str> {
        Html(include_str!("../static/index.html"))
    }

    async fn health_check() -> &'static str {
        "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::render::{GENERAL_ERROR_MARKER, TRANSPORT_ERROR_MARKER};
    use super::server::create_router;
    use crate::handlers::SessionRegistry;
    use crate::services::ai_service::testing::StubModel;
    use crate::services::{GeminiClient, GenerativeModel};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R'];

    fn router_with(model: Arc<dyn GenerativeModel>) -> Router {
        create_router(Arc::new(SessionRegistry::new(model)), 1024)
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Body, content_type: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post(router: &Router, uri: &str) -> (StatusCode, Value) {
        send(router, Method::POST, uri, Body::empty(), "application/json").await
    }

    async fn new_session(router: &Router) -> String {
        let (status, view) = post(router, "/api/sessions").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view["stage"], json!("empty"));
        view["session_id"].as_str().unwrap().to_string()
    }

    async fn upload(router: &Router, id: &str, bytes: &[u8]) -> (StatusCode, Value) {
        send(
            router,
            Method::POST,
            &format!("/api/sessions/{}/image", id),
            Body::from(bytes.to_vec()),
            "image/png",
        )
        .await
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let router = router_with(Arc::new(StubModel::replying("report")));

        let response = router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&html).contains("Cardiology Scan Analyst"));

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_sanitizes_rendered_markdown() {
        let router = router_with(Arc::new(StubModel::replying("report")));

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8_lossy(&html);

        assert!(html.contains("DOMPurify.sanitize(window.marked.parse(text))"));
        assert!(html.contains(r#"replace(/&/g, "&amp;")"#));
        assert!(html.contains(r#"replace(/>/g, "&gt;")"#));
        assert!(html.contains("error.status === 404"));
    }

    #[tokio::test]
    async fn test_swept_session_answers_not_found_and_a_new_one_can_start() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(StubModel::replying("report"))));
        let router = create_router(registry.clone(), 1024);
        let id = new_session(&router).await;

        assert_eq!(registry.sweep_idle(chrono::Duration::zero()), 1);

        let (status, body) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        let fresh = new_session(&router).await;
        assert_ne!(fresh, id);
    }

    #[tokio::test]
    async fn test_form_flow_through_api() {
        let stub = Arc::new(StubModel::replying("## Interpretation\nSinus tachycardia"));
        let router = router_with(stub.clone());
        let id = new_session(&router).await;

        let (status, view) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(view["error"], json!("Please upload an image first."));

        let (status, view) = upload(&router, &id, PNG).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["image_mime_type"], json!("image/png"));
        assert_eq!(view["can_analyze"], json!(true));

        let (status, view) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["stage"], json!("primary_reported"));
        assert_eq!(view["primary_report"]["status"], json!("ok"));
        assert_eq!(view["primary_report"]["markdown"], json!("## Interpretation\nSinus tachycardia"));

        let (status, _) = post(&router, &format!("/api/sessions/{}/personalize", id)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, view) = send(
            &router,
            Method::PUT,
            &format!("/api/sessions/{}/inputs", id),
            Body::from(json!({"allergies": "peanuts", "location": "Boston"}).to_string()),
            "application/json",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["can_personalize"], json!(true));

        let (status, view) = post(&router, &format!("/api/sessions/{}/personalize", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["stage"], json!("personalized_reported"));
        assert!(!view["personalized_report"]["markdown"].as_str().unwrap().is_empty());

        let (status, view) = post(&router, &format!("/api/sessions/{}/clear", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["stage"], json!("empty"));
        assert_eq!(view["primary_report"], Value::Null);
        assert_eq!(view["allergies"], json!(""));
    }

    #[tokio::test]
    async fn test_upload_validation_and_unknown_session() {
        let router = router_with(Arc::new(StubModel::replying("report")));
        let id = new_session(&router).await;

        let (status, _) = send(
            &router,
            Method::POST,
            &format!("/api/sessions/{}/image", id),
            Body::from(b"GIF89a".to_vec()),
            "image/gif",
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, _) = upload(&router, &id, &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = upload(&router, &id, &[0u8; 2048]).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = post(&router, &format!("/api/sessions/{}/analyze", missing)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&router, Method::DELETE, &format!("/api/sessions/{}", id), Body::empty(), "application/json").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, Method::GET, &format!("/api/sessions/{}", id), Body::empty(), "application/json").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_repeated_analysis_reaches_gemini_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "The ECG is within normal limits."}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(
            format!("{}/v1beta/models/test:generateContent", server.uri()),
            Some("key".to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        let router = router_with(Arc::new(client));
        let id = new_session(&router).await;
        upload(&router, &id, PNG).await;

        let (_, first) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;
        let (_, second) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;

        assert_eq!(first["primary_report"], second["primary_report"]);
        assert_eq!(
            second["primary_report"]["markdown"],
            json!("The ECG is within normal limits.")
        );
        // MockServer verifies expect(1) on drop
    }

    #[tokio::test]
    async fn test_model_failures_render_as_marked_text() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let unreachable = GeminiClient::new(format!("http://{}/generate", addr), None, Some(Duration::from_secs(2))).unwrap();
        let router = router_with(Arc::new(unreachable));
        let id = new_session(&router).await;
        upload(&router, &id, PNG).await;

        let (status, view) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["primary_report"]["status"], json!("transport_error"));
        assert!(view["primary_report"]["markdown"]
            .as_str()
            .unwrap()
            .starts_with(TRANSPORT_ERROR_MARKER));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        let garbled = GeminiClient::new(server.uri(), None, None).unwrap();
        let router = router_with(Arc::new(garbled));
        let id = new_session(&router).await;
        upload(&router, &id, PNG).await;

        let (_, view) = post(&router, &format!("/api/sessions/{}/analyze", id)).await;
        assert!(view["primary_report"]["markdown"]
            .as_str()
            .unwrap()
            .starts_with(GENERAL_ERROR_MARKER));
    }
}
