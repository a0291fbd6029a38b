//! Handler-level tests driven through the router with oneshot requests.
//!
//! These cover the input-validation and error-mapping paths that do not
//! need a live database behind the handle slots.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pg_mysql_migrate_server::app;

fn test_router() -> axum::Router {
    app::router(app::AppState::new(None))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn connect_requires_connection_string() {
    let response = test_router()
        .oneshot(post_json("/connect/source", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(false));
    assert_eq!(json["message"], serde_json::json!("Connection string is required"));
}

#[tokio::test]
async fn connect_failure_is_reported_in_band() {
    let response = test_router()
        .oneshot(post_json(
            "/connect/target",
            r#"{"connectionString": "not a uri"}"#,
        ))
        .await
        .unwrap();

    // Parse failures come back as a normal response with success=false.
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(false));
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Invalid connection string"));
}

#[tokio::test]
async fn unknown_role_is_bad_request() {
    let response = test_router().oneshot(get("/tables/primary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("Unknown database role"));
}

#[tokio::test]
async fn tables_without_connection_is_bad_request() {
    let response = test_router().oneshot(get("/tables/source")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        serde_json::json!("source database is not connected")
    );
}

#[tokio::test]
async fn preview_without_connection_is_bad_request() {
    let response = test_router()
        .oneshot(get("/preview/target/users?limit=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        serde_json::json!("target database is not connected")
    );
}

#[tokio::test]
async fn migrate_requires_table_names() {
    let response = test_router()
        .oneshot(post_json("/migrate", r#"{"sourceTable": "users"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        serde_json::json!("Source and target table names are required")
    );
}

#[tokio::test]
async fn migrate_without_connections_fails_precondition() {
    let response = test_router()
        .oneshot(post_json(
            "/migrate",
            r#"{"sourceTable": "users", "targetTable": "users"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(false));
    assert!(json["message"].as_str().unwrap().contains("must be connected"));
}

#[tokio::test]
async fn progress_before_any_run_is_zero_state() {
    let response = test_router()
        .oneshot(get("/migration-progress"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["totalRecords"], serde_json::json!(0));
    assert_eq!(json["migratedRecords"], serde_json::json!(0));
    assert_eq!(json["percentage"], serde_json::json!(0));
    assert_eq!(json["isComplete"], serde_json::json!(false));
}

#[tokio::test]
async fn progress_rejects_malformed_run_ids() {
    let response = test_router()
        .oneshot(get("/migration-progress?id=not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = test_router()
        .oneshot(get(
            "/migration-progress?id=00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_empty_slots() {
    let response = test_router().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(true));
    assert_eq!(json["source"], serde_json::Value::Null);
    assert_eq!(json["target"], serde_json::Value::Null);
}
