use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{self, RowSet};
use crate::llm::models::{AiResponse, ReportKind, Translation, VisualizationType};
use crate::report::{self, ReportArtifact};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub user_question: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub user_question: String,
}

/// JSON shape returned for every non-attachment result. Nulls are sent
/// explicitly so the frontend always sees the same keys.
#[derive(Debug, Serialize)]
pub struct AnalyzePayload {
    pub message: String,
    pub query: Option<String>,
    pub data: Option<Vec<Map<String, Value>>>,
    pub visualization_type: Option<VisualizationType>,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
}

impl AnalyzePayload {
    /// Conversational or recovered-failure reply: message only, no data.
    fn text(message: String) -> Self {
        Self {
            message,
            query: None,
            data: None,
            visualization_type: Some(VisualizationType::Text),
            x_axis: None,
            y_axis: None,
            label: None,
            value: None,
        }
    }

    /// Degraded report: the data as a plain table with an explanation.
    fn table_fallback(message: String, query: String, rows: RowSet) -> Self {
        Self {
            message,
            query: Some(query),
            data: Some(rows.rows),
            visualization_type: Some(VisualizationType::Table),
            x_axis: None,
            y_axis: None,
            label: None,
            value: None,
        }
    }

    /// Full answer: AI hints pass through verbatim for the chart renderer.
    fn from_response(ai: AiResponse, rows: RowSet) -> Self {
        Self {
            message: ai.message,
            query: ai.sql_query,
            data: Some(rows.rows),
            visualization_type: ai.visualization_type,
            x_axis: ai.x_axis,
            y_axis: ai.y_axis,
            label: ai.label,
            value: ai.value,
        }
    }
}

/// `POST /analyze` — the whole pipeline: translate, gate, execute,
/// render or return JSON.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Response, (StatusCode, String)> {
    run_pipeline(&state, &payload.user_question, None).await
}

/// `GET /report/csv?user_question=…` — same pipeline, but the result is
/// always rendered as a CSV attachment when a query was generated.
pub async fn report_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, (StatusCode, String)> {
    run_pipeline(&state, &query.user_question, Some(ReportKind::Csv)).await
}

async fn run_pipeline(
    state: &Arc<AppState>,
    question: &str,
    forced_report: Option<ReportKind>,
) -> Result<Response, (StatusCode, String)> {
    let question = question.trim();
    if question.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "user_question must not be empty".to_string(),
        ));
    }

    info!("Analyzing question: {}", question);

    let schema_text = state.schema_catalog.describe().await.map_err(|e| {
        error!("Schema introspection failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    // Transport/auth failures are fatal for the request; refusals and
    // unparseable replies degrade to a friendly text answer.
    let translation = state
        .llm_manager
        .translate(question, &schema_text)
        .await
        .map_err(|e| {
            error!("Translation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let ai = match translation {
        Translation::Blocked { reason } => {
            return Ok(Json(AnalyzePayload::text(format!(
                "The request was blocked by the provider's content filter ({}). Please rephrase your question.",
                reason
            )))
            .into_response());
        }
        Translation::Malformed { message, reason } => {
            warn!("Unusable model reply: {}", reason);
            let message = if message.is_empty() {
                "The model reply could not be interpreted. Please rephrase your question."
                    .to_string()
            } else {
                message
            };
            return Ok(Json(AnalyzePayload::text(message)).into_response());
        }
        Translation::Answered(ai) => ai,
    };

    // Conversational answer: nothing to execute
    let sql = match ai.sql_query.clone() {
        Some(sql) => sql,
        None => return Ok(Json(AnalyzePayload::text(ai.message)).into_response()),
    };

    // The gate runs before any database call; a rejection is final but
    // answered with an explanation, not a stack trace.
    if let Err(e) = db::guard::check_query(&sql) {
        return Ok(Json(AnalyzePayload {
            message: format!("The generated query was rejected: {}", e),
            query: Some(sql),
            data: None,
            visualization_type: Some(VisualizationType::Text),
            x_axis: None,
            y_axis: None,
            label: None,
            value: None,
        })
        .into_response());
    }

    let rows = db::executor::execute_query(&state.db_pool, &sql, state.query_timeout())
        .await
        .map_err(|e| {
            error!("Query execution failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let report_title = if ai.message.trim().is_empty() {
        question.to_string()
    } else {
        ai.message.clone()
    };

    if let Some(kind) = forced_report {
        return render_attachment(kind, &rows, &report_title);
    }

    if ai.visualization_type == Some(VisualizationType::Report) {
        match ai.report_type.as_deref().and_then(ReportKind::parse) {
            Some(kind) => return render_attachment(kind, &rows, &report_title),
            None => {
                // Unknown format degrades to a JSON table, never fails
                let requested = ai.report_type.as_deref().unwrap_or("none").to_string();
                warn!("Unsupported report format '{}', returning raw data", requested);
                return Ok(Json(AnalyzePayload::table_fallback(
                    format!(
                        "Report format '{}' is not supported. Returning the raw data instead.",
                        requested
                    ),
                    sql,
                    rows,
                ))
                .into_response());
            }
        }
    }

    Ok(Json(AnalyzePayload::from_response(ai, rows)).into_response())
}

fn render_attachment(
    kind: ReportKind,
    rows: &RowSet,
    title: &str,
) -> Result<Response, (StatusCode, String)> {
    let artifact = report::render(kind, rows, title).map_err(|e| {
        error!("Report rendering failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(attachment_response(artifact))
}

fn attachment_response(artifact: ReportArtifact) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(artifact.mime));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename={}", artifact.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    (headers, artifact.bytes).into_response()
}

/// `GET /` — service banner.
pub async fn root() -> Json<Value> {
    Json(serde_json::json!({
        "message": "Ask-BI API. POST a question to /analyze to get started."
    }))
}

/// `GET /health/db` — round trip through the pool.
pub async fn health_db(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let value: i32 = sqlx::query_scalar("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
        .map_err(|e| {
            error!("Database health check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(serde_json::json!({ "db": value == 1 })))
}

/// `GET /health/ai` — one-shot ping through the configured provider.
pub async fn health_ai(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let ok = state.llm_manager.ping().await.map_err(|e| {
        error!("AI health check failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(serde_json::json!({
        "ai": ok,
        "model": state.llm_manager.model(),
    })))
}

/// `POST /schema/refresh` — manual hook to rebuild the cached schema text.
pub async fn refresh_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.schema_catalog.refresh().await.map_err(|e| {
        error!("Schema refresh failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(serde_json::json!({ "refreshed": true })))
}
