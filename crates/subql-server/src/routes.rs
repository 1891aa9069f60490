//! HTTP API
//!
//! - `POST /sql`: execute SQL against the shared database
//! - `POST /substrait`: produce a Substrait plan for a SQL statement
//! - `POST /substrait/execute`: run a binary plan
//! - `POST /substrait/execute/json`: run a JSON plan
//! - `GET /health`, `GET /metrics`

use crate::log_event;
use crate::metrics::Metrics;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use subql_engine::{
    Catalog, Connection, Database, Error as EngineError, ExecutionBudget, ExecutionError,
    JsonResult, PlanEncoding, QueryResult, SerializedPlan, SubstraitError,
};
use tracing::{Level, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub budget: ExecutionBudget,
    pub plan_format: PlanEncoding,
    pub metrics: Arc<Metrics>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(db: Database, budget: ExecutionBudget, plan_format: PlanEncoding, metrics: Metrics) -> Self {
        Self {
            db,
            budget,
            plan_format,
            metrics: Arc::new(metrics),
            started_at: chrono::Utc::now(),
        }
    }

    fn connection(&self) -> Connection {
        Connection::connect(&self.db).with_budget(self.budget.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct SqlRequest {
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub sql: String,
    #[serde(default)]
    pub format: Option<PlanEncoding>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub result: JsonResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::Parse(_) | EngineError::Bind(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Substrait(SubstraitError::UnresolvedCatalogReference(_)))
            | ApiError::Engine(EngineError::Execution(ExecutionError::TableNotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Engine(EngineError::Substrait(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Execution(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => e.kind(),
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::Internal(m) => m.clone(),
        };
        let body = ErrorResponse {
            error: message,
            kind: self.kind(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sql", post(execute_sql))
        .route("/substrait", post(produce_plan))
        .route("/substrait/execute", post(execute_binary_plan))
        .route("/substrait/execute/json", post(execute_json_plan))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// Run `work` on the blocking pool with a fresh connection, recording
/// metrics and a log event for the request.
async fn run<T, F>(state: &AppState, route: &'static str, work: F) -> Result<(String, T), ApiError>
where
    T: Send + 'static,
    F: FnOnce(Connection) -> subql_engine::Result<T> + Send + 'static,
{
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();
    let con = state.connection();

    let result = match tokio::task::spawn_blocking(move || work(con)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(format!("worker failed: {}", e))),
    };

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    state.metrics.observe(route, status.as_u16(), start.elapsed());

    match &result {
        Ok(_) => {
            log_event!(
                level: Level::INFO,
                event: "request_completed",
                request_id: request_id,
                route: route,
                duration_ms: start.elapsed().as_millis()
            );
        }
        Err(e) => {
            state.metrics.record_error(e.kind());
            warn!(request_id = %request_id, route, kind = e.kind(), status = status.as_u16(), "Request failed");
        }
    }
    result.map(|value| (request_id, value))
}

async fn execute_sql(
    State(state): State<AppState>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let (request_id, result) = run(&state, "/sql", move |con| con.execute(&req.sql)).await?;
    Ok(Json(response(request_id, result)))
}

async fn produce_plan(State(state): State<AppState>, Json(req): Json<PlanRequest>) -> Result<Response, ApiError> {
    let encoding = req.format.unwrap_or(state.plan_format);
    let (request_id, plan) = run(&state, "/substrait", move |con| con.produce_plan(&req.sql, encoding)).await?;
    state.metrics.record_plan("produced", encoding);

    let request_id = (header::HeaderName::from_static("x-request-id"), request_id);
    Ok(match plan {
        SerializedPlan::Binary(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream".to_string()), request_id],
            bytes,
        )
            .into_response(),
        SerializedPlan::Json(text) => (
            [(header::CONTENT_TYPE, "application/json".to_string()), request_id],
            text,
        )
            .into_response(),
    })
}

async fn execute_binary_plan(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    let (request_id, result) = run(&state, "/substrait/execute", move |con| con.from_substrait(&body)).await?;
    state.metrics.record_plan("consumed", PlanEncoding::Binary);
    Ok(Json(response(request_id, result)))
}

async fn execute_json_plan(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<QueryResponse>, ApiError> {
    let (request_id, result) =
        run(&state, "/substrait/execute/json", move |con| con.from_substrait_json(&body)).await?;
    state.metrics.record_plan("consumed", PlanEncoding::Json);
    Ok(Json(response(request_id, result)))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "tables": state.db.table_names(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {}", e)))
}

fn response(request_id: String, result: QueryResult) -> QueryResponse {
    QueryResponse {
        request_id,
        result: result.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> AppState {
        AppState::new(
            Database::new(),
            ExecutionBudget::unlimited(),
            PlanEncoding::Binary,
            Metrics::new().unwrap(),
        )
    }

    async fn sql(state: &AppState, sql: &str) -> QueryResponse {
        let Json(response) = execute_sql(State(state.clone()), Json(SqlRequest { sql: sql.to_string() }))
            .await
            .unwrap();
        response
    }

    async fn plan(state: &AppState, sql: &str, format: Option<PlanEncoding>) -> Result<Response, ApiError> {
        produce_plan(
            State(state.clone()),
            Json(PlanRequest {
                sql: sql.to_string(),
                format,
            }),
        )
        .await
    }

    #[tokio::test]
    async fn test_binary_plan_round_trip() {
        let state = state();
        sql(&state, "CREATE TABLE integers (i INTEGER); INSERT INTO integers VALUES (1), (2), (3)").await;

        let response = plan(&state, "SELECT i FROM integers WHERE i > 1", None).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert!(response.headers().contains_key("x-request-id"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

        let Json(result) = execute_binary_plan(State(state.clone()), bytes).await.unwrap();
        assert_eq!(result.result.columns, vec!["i"]);
        assert_eq!(result.result.rows, vec![vec![json!(2)], vec![json!(3)]]);
    }

    #[tokio::test]
    async fn test_json_plan_round_trip() {
        let state = state();
        sql(&state, "CREATE TABLE t (name VARCHAR, amount DECIMAL(8, 2)); INSERT INTO t VALUES ('a', 1.5)").await;

        let response = plan(&state, "SELECT name, amount FROM t", Some(PlanEncoding::Json)).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        let Json(result) = execute_json_plan(State(state.clone()), text).await.unwrap();
        assert_eq!(result.result.types, vec!["VARCHAR", "DECIMAL(8,2)"]);
        assert_eq!(result.result.rows, vec![vec![json!("a"), json!("1.50")]]);
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let state = state();

        let err = plan(&state, "SELECT * FROM missing", None).await.err().expect("missing table");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "unresolved_catalog_reference");

        let err = execute_json_plan(State(state.clone()), "{".to_string())
            .await
            .err()
            .expect("malformed plan");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = execute_sql(State(state.clone()), Json(SqlRequest { sql: "SELEC 1".to_string() }))
            .await
            .err()
            .expect("parse error");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let metrics = render_metrics(State(state)).await.unwrap();
        assert!(metrics.contains("subql_errors_total{kind=\"malformed_plan\"} 1"));
        assert!(metrics.contains("subql_requests_total{route=\"/substrait\",status=\"404\"} 1"));
        assert!(!metrics.contains("subql_plans_total{"));
    }

    #[tokio::test]
    async fn test_health_lists_tables() {
        let state = state();
        sql(&state, "CREATE TABLE b (x INTEGER); CREATE TABLE a (y INTEGER)").await;
        let Json(health) = health_check(State(state)).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["tables"], json!(["a", "b"]));
    }
}
