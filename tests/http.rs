use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use pdf_renderer::{
    application::pipeline::{ConnectionAbort, Pipeline, PipelineConfig, RequestId},
    infra::{
        artifacts::ArtifactStore,
        http::{HttpState, build_router},
        pdf::PdfRenderer,
        telemetry::MetricsObservability,
    },
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

fn app(config: PipelineConfig) -> (TempDir, Router) {
    let temp = tempfile::tempdir().expect("tempdir");
    let pipeline = Pipeline::new(
        config,
        ArtifactStore::new(temp.path().join("artifacts")),
        Arc::new(MetricsObservability),
        Arc::new(PdfRenderer),
    );
    let router = build_router(HttpState {
        pipeline: Arc::new(pipeline),
    });
    (temp, router)
}

async fn post(router: &Router, body: impl Into<Body>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn post_json(router: &Router, payload: Value) -> Response {
    post(router, serde_json::to_vec(&payload).expect("encode payload")).await
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8_lossy(&bytes).into_owned()
}

fn sample_document() -> Value {
    json!({
        "title": "Quarterly Report: Q3",
        "author": "Finance",
        "pageSize": "A4",
        "content": [
            {
                "type": "page",
                "style": { "padding": 48 },
                "children": [
                    { "type": "text", "value": "Quarterly Report", "style": { "fontSize": 24, "fontWeight": "bold" } },
                    { "type": "view", "style": { "marginTop": 12, "marginLeft": 8 }, "children": [
                        { "type": "text", "value": "Revenue grew in every region this quarter." },
                        { "type": "text", "value": "Costs held flat.", "style": { "color": "#555" } }
                    ]},
                    { "type": "break" },
                    { "type": "text", "value": "Appendix" }
                ]
            }
        ]
    })
}

#[tokio::test]
async fn renders_a_pdf_attachment() {
    let (_temp, router) = app(PipelineConfig::default());
    let response = post_json(&router, sample_document()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"application/pdf"[..])
    );
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .map(|v| v.as_bytes()),
        Some(&b"attachment; filename=\"Quarterly_Report__Q3.pdf\""[..])
    );
    assert!(response.extensions().get::<RequestId>().is_some());

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    assert!(bytes.starts_with(b"%PDF-"));
}

#[tokio::test]
async fn strict_documents_are_validated() {
    let (_temp, router) = app(PipelineConfig::default());
    let response = post_json(
        &router,
        json!({ "strict": true, "content": [{ "type": "page", "children": [{ "type": "image" }] }] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = text(response).await;
    assert!(body.starts_with("The request was not valid: "));
    assert!(body.contains("/content/0/children/0/type"));
}

#[tokio::test]
async fn unvalidated_bad_documents_fail_in_the_builder() {
    let (_temp, router) = app(PipelineConfig::default());
    let response = post_json(
        &router,
        json!({ "content": [{ "type": "page", "children": [{ "type": "image" }] }] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        text(response).await,
        "Error (UnknownElement): unknown element type `image`\nRender Stack: Document > Page[0] > image[0]"
    );
}

#[tokio::test]
async fn malformed_json_is_a_server_error() {
    let (_temp, router) = app(PipelineConfig::default());
    let response = post(&router, "{\"title\": ").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(response).await.starts_with("Error generating the pdf: "));
}

#[tokio::test]
async fn oversized_bodies_are_marked_for_abort() {
    let (_temp, router) = app(PipelineConfig {
        max_body_bytes: 64,
        ..PipelineConfig::default()
    });
    let response = post(&router, vec![b' '; 65]).await;

    assert!(response.extensions().get::<ConnectionAbort>().is_some());
}

#[tokio::test]
async fn bodies_above_axum_default_limit_are_accepted() {
    let (_temp, router) = app(PipelineConfig::default());
    let mut payload = sample_document();
    payload["padding"] = Value::String("x".repeat(3 * 1024 * 1024));

    let response = post_json(&router, payload).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_check_returns_no_content() {
    let (_temp, router) = app(PipelineConfig::default());
    let request = Request::builder()
        .uri("/_health")
        .body(Body::empty())
        .expect("request should build");
    let response = router.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (_temp, router) = app(PipelineConfig::default());
    let request = Request::builder()
        .uri("/missing")
        .body(Body::empty())
        .expect("request should build");
    let response = router.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
