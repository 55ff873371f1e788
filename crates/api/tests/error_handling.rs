//! Tests for `AppError` → HTTP response mapping.
//!
//! Most tests call `IntoResponse` directly on `AppError` values. The last
//! one drives a panicking handler through the panic-recovery layer.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use stemsplit_api::error::AppError;
use stemsplit_api::router::panic_response;
use stemsplit_core::error::CoreError;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: CoreError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: "abc".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id abc not found");
}

// ---------------------------------------------------------------------------
// Test: CoreError::Validation maps to 400 with the bare message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("shifts must be between 1 and 20".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "shifts must be between 1 and 20");
}

// ---------------------------------------------------------------------------
// Test: AppError::BadRequest maps to 400 with BAD_REQUEST code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("Missing required 'file' field".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "Missing required 'file' field");
}

// ---------------------------------------------------------------------------
// Test: AppError::PayloadTooLarge maps to 413
// ---------------------------------------------------------------------------

#[tokio::test]
async fn payload_too_large_returns_413() {
    let err = AppError::PayloadTooLarge("body limit exceeded".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
}

// ---------------------------------------------------------------------------
// Test: internal errors never leak their details
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_errors_are_sanitized() {
    for err in [
        AppError::InternalError("disk /srv/uploads is full".into()),
        AppError::Core(CoreError::Internal("copy /tmp/x: denied".into())),
    ] {
        let (status, json) = error_to_response(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"], "An internal error occurred");
    }
}

// ---------------------------------------------------------------------------
// Test: a panicking handler yields the JSON error envelope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_panic_returns_json_500() {
    async fn explode() -> &'static str {
        panic!("stem index out of range");
    }

    let app = Router::new()
        .route("/explode", get(explode))
        .layer(CatchPanicLayer::custom(panic_response));

    let response = app
        .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
