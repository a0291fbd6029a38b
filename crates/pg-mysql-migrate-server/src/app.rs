//! HTTP surface: application state, routes, handlers, and error mapping.
//!
//! Every error is recovered into a uniform `{success: false, message}` JSON
//! body: 400 for caller input problems (missing fields, unknown role, not
//! connected, failed preconditions), 500 for backend failures. Raw driver
//! errors are carried in the message text only.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use pg_mysql_migrate::{
    ConnectionManager, EngineOptions, MigrateError, MigrationEngine, MigrationProgress,
    ProgressRegistry, Role, SchemaIntrospector,
};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub introspector: Arc<SchemaIntrospector>,
    pub engine: Arc<MigrationEngine>,
    pub registry: Arc<ProgressRegistry>,
}

impl AppState {
    pub fn new(batch_cap: Option<usize>) -> Self {
        let manager = Arc::new(ConnectionManager::new());
        let registry = Arc::new(ProgressRegistry::new());
        let engine = MigrationEngine::new(manager.clone(), registry.clone())
            .with_options(EngineOptions { batch_cap });

        Self {
            introspector: Arc::new(SchemaIntrospector::new(manager.clone())),
            engine: Arc::new(engine),
            manager,
            registry,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/connect/:role", post(connect))
        .route("/tables/:role", get(tables))
        .route("/preview/:role/:table", get(preview))
        .route("/migrate", post(migrate))
        .route("/migration-progress", get(progress))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Errors leaving the handler layer, already sorted by status code.
enum ApiError {
    BadRequest(String),
    Backend(String),
    NotFound(String),
}

impl From<MigrateError> for ApiError {
    fn from(e: MigrateError) -> Self {
        match e {
            MigrateError::Config(_)
            | MigrateError::NotConnected { .. }
            | MigrateError::Precondition(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Backend(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Backend(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse::<Role>().map_err(|e| ApiError::BadRequest(e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    connection_string: Option<String>,
}

async fn connect(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Json(body): Json<ConnectRequest>,
) -> Result<Response, ApiError> {
    let role = parse_role(&role)?;
    let conn_str = body
        .connection_string
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Connection string is required".to_string()))?;

    // Connect failures are reported in-band with success=false, not as an
    // HTTP error; the status message carries the failure classification.
    let status = state.manager.connect(role, &conn_str).await;
    Ok(Json(status).into_response())
}

async fn tables(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Response, ApiError> {
    let role = parse_role(&role)?;
    let tables = state.introspector.list_tables(role).await?;
    Ok(Json(json!({ "success": true, "tables": tables })).into_response())
}

#[derive(Deserialize)]
struct PreviewParams {
    limit: Option<usize>,
}

async fn preview(
    State(state): State<AppState>,
    Path((role, table)): Path<(String, String)>,
    Query(params): Query<PreviewParams>,
) -> Result<Response, ApiError> {
    let role = parse_role(&role)?;
    let rows = state
        .introspector
        .preview_rows(role, &table, params.limit)
        .await?;
    let data: Vec<_> = rows.iter().map(|r| r.to_json_object()).collect();
    Ok(Json(json!({ "success": true, "data": data })).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrateRequest {
    source_table: Option<String>,
    target_table: Option<String>,
}

async fn migrate(
    State(state): State<AppState>,
    Json(body): Json<MigrateRequest>,
) -> Result<Response, ApiError> {
    let (source_table, target_table) = match (body.source_table, body.target_table) {
        (Some(s), Some(t)) if !s.trim().is_empty() && !t.trim().is_empty() => (s, t),
        _ => {
            return Err(ApiError::BadRequest(
                "Source and target table names are required".to_string(),
            ));
        }
    };

    let result = state.engine.migrate(&source_table, &target_table, None).await?;
    Ok(Json(result).into_response())
}

#[derive(Deserialize)]
struct ProgressParams {
    id: Option<String>,
}

async fn progress(
    State(state): State<AppState>,
    Query(params): Query<ProgressParams>,
) -> Result<Response, ApiError> {
    let snapshot = match params.id {
        Some(raw) => {
            let run_id = Uuid::parse_str(&raw)
                .map_err(|_| ApiError::BadRequest(format!("Invalid run id '{}'", raw)))?;
            state
                .registry
                .get(run_id)
                .ok_or_else(|| ApiError::NotFound(format!("No migration run '{}'", run_id)))?
                .snapshot()
        }
        // Without an id, report the most recent run; before any migration
        // has started this is the zero state.
        None => state
            .registry
            .latest()
            .map(|handle| handle.snapshot())
            .unwrap_or_else(MigrationProgress::zero),
    };

    Ok(Json(snapshot).into_response())
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state.manager.status().await;
    Json(json!({
        "success": true,
        "source": status.source,
        "target": status.target,
    }))
    .into_response()
}
