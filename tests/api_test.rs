mod common;

use axum::http::{header, Method, Request, StatusCode};
use axum::body::Body;
use serde_json::json;
use tokio_test::assert_ok;
use tower::ServiceExt;
use uuid::Uuid;

use common::{offline_app, send, token};

#[tokio::test]
async fn health_reports_ok() {
    let app = offline_app(100);
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn openapi_document_lists_workflow_paths() {
    let app = offline_app(100);
    let (status, body) = send(&app, Method::GET, "/api/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().expect("paths object");
    assert!(paths.contains_key("/api/exams/{id}/start"));
    assert!(paths.contains_key("/api/exams/attempts/{attempt_id}/answers/{question_id}/grade"));
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = offline_app(100);

    let (status, body) = send(&app, Method::GET, "/api/exams", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let (status, body) = send(&app, Method::GET, "/api/exams", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/exams")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = assert_ok!(app.clone().oneshot(request).await);
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn negative_grade_is_rejected_before_touching_storage() {
    let app = offline_app(100);
    let examiner = token(Uuid::new_v4(), "EXAMINER", Some(Uuid::new_v4()));
    let uri = format!(
        "/api/exams/attempts/{}/answers/{}/grade",
        Uuid::new_v4(),
        Uuid::new_v4()
    );

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(&examiner),
        Some(json!({ "score": -5, "feedback": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn registration_validates_fields() {
    let app = offline_app(100);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/institutions",
        None,
        Some(json!({
            "name": "North High",
            "adminName": "Ada",
            "adminEmail": "not-an-email",
            "adminPassword": "short"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn invitation_acceptance_validates_token_length() {
    let app = offline_app(100);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/invitations/accept",
        None,
        Some(json!({ "token": "abc", "name": "Ada", "password": "long enough pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_requests_are_rate_limited() {
    let app = offline_app(1);
    let body = json!({
        "name": "",
        "adminName": "",
        "adminEmail": "x",
        "adminPassword": ""
    });

    let (first, _) = send(&app, Method::POST, "/api/institutions", None, Some(body.clone())).await;
    assert_eq!(first, StatusCode::BAD_REQUEST);

    let (second, payload) = send(&app, Method::POST, "/api/institutions", None, Some(body)).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(payload["error"], "rate_limit_exceeded");

    let (health, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(health, StatusCode::OK);
}
