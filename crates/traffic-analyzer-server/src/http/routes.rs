//! Route table and handlers for the endpoints in the component's design.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use traffic_analyzer_core::model::{ReportDataRow, ReportFormat, ReportParameters};

use crate::error::AppError;
use crate::jobs::JobSignal;
use crate::reconcile_service::ReconciliationRequest;
use crate::render::{RenderError, ReportRowSource, render_excel, render_json_stream_from_db};

use super::AppState;

const RENDER_TIMEOUT: Duration = Duration::from_secs(120);

pub fn health_router() -> Router<AppState> {
    Router::new().route("/live", get(live)).route("/ready", get(ready)).route("/startup", get(startup))
}

pub fn api_router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/api/v1/admin/capture/{capture_id}/load", get(load_capture))
        .route("/api/v1/admin/capture/{capture_id}/status", get(capture_status))
        .route("/api/v1/admin/capture/{capture_id}/delete", delete(delete_capture))
        .route("/api/v1/report/service/operations/generate", post(generate_report))
        .route("/api/v1/report/service/operations/render", get(render_report));
    router = router.route("/api/v1/admin/capture/S3/cleanup", delete(cleanup_storage));
    router = router
        .route("/api/v1/debug/jobs", get(debug_jobs))
        .route("/api/v1/debug/headers", get(debug_header_stats));
    router
}

async fn live() -> StatusCode {
    StatusCode::OK
}

/// Dependency check, not just a process-up signal: a dead connection pool
/// means the process is alive but can't serve anything useful.
async fn ready(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn startup(State(state): State<AppState>) -> StatusCode {
    if state.migrations_complete.load(std::sync::atomic::Ordering::Acquire) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn require_non_production(state: &AppState) -> Result<(), AppError> {
    if state.config.production_mode {
        return Err(AppError::MissingResource("not found".into()));
    }
    Ok(())
}

/// `GET /api/v1/debug/jobs` — non-production only: a dump of the in-memory
/// job tracker history.
async fn debug_jobs(State(state): State<AppState>) -> Result<Response, AppError> {
    require_non_production(&state)?;
    Ok(Json(state.jobs.snapshot()).into_response())
}

/// `GET /api/v1/debug/headers` — non-production only: header-dictionary
/// in-memory cache occupancy.
async fn debug_header_stats(State(state): State<AppState>) -> Result<Response, AppError> {
    require_non_production(&state)?;
    Ok(Json(state.headers.stats()).into_response())
}

fn now_micros() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() * 1_000_000
}

fn validate_capture_id(capture_id: &str) -> Result<(), AppError> {
    if capture_id.trim().is_empty() {
        return Err(AppError::InvalidInput("capture id must not be empty".into()));
    }
    Ok(())
}

/// `GET /api/v1/admin/capture/{captureId}/load` — stages artifacts from
/// object storage and ingests them, as a detached background task. 202 on
/// accepted start, 206 if a job for this capture is already running.
async fn load_capture(State(state): State<AppState>, Path(capture_id): Path<String>) -> Result<StatusCode, AppError> {
    validate_capture_id(&capture_id)?;

    match state.jobs.start(&capture_id, now_micros()) {
        Ok(()) => {}
        Err(_already_in_progress) => return Ok(StatusCode::PARTIAL_CONTENT),
    }

    let capture_id_for_task = capture_id.clone();
    tokio::spawn(async move {
        let work_dir = std::path::PathBuf::from(&state.config.work_dir).join(&capture_id_for_task);
        let result = run_load(&state, &capture_id_for_task, &work_dir).await;
        let error = result.err().map(|e| e.to_string());
        if let Some(err) = &error {
            tracing::warn!(capture_id = %capture_id_for_task, error = %err, "capture load failed");
        }
        let _ = state.jobs.sender().send(JobSignal::Completed { capture_id: capture_id_for_task, error });
    });

    Ok(StatusCode::ACCEPTED)
}

async fn run_load(state: &AppState, capture_id: &str, work_dir: &std::path::Path) -> Result<(), AppError> {
    std::fs::create_dir_all(work_dir).map_err(|e| AppError::Internal(e.into()))?;
    state.storage.stage_capture(capture_id, work_dir).await?;
    state.ingester.ingest_directory(capture_id, work_dir, work_dir).await.map_err(|e| AppError::Internal(e.into()))?;
    Ok(())
}

#[derive(Serialize)]
struct CaptureStatusResponse {
    capture_id: String,
    begin_ts: i64,
    end_ts: Option<i64>,
}

/// `GET /api/v1/admin/capture/{captureId}/status` — 200 done, 201 loading,
/// 417 completed-with-error, 404 unknown.
async fn capture_status(State(state): State<AppState>, Path(capture_id): Path<String>) -> Result<Response, AppError> {
    validate_capture_id(&capture_id)?;
    let Some(entry) = state.jobs.status(&capture_id) else {
        return Err(AppError::MissingResource(format!("no job history for capture {capture_id}")));
    };

    if !entry.is_complete() {
        return Ok((StatusCode::CREATED, Json(CaptureStatusResponse { capture_id, begin_ts: entry.begin_ts, end_ts: None })).into_response());
    }
    if entry.error.is_some() {
        return Ok(StatusCode::EXPECTATION_FAILED.into_response());
    }
    Ok((
        StatusCode::OK,
        Json(CaptureStatusResponse { capture_id, begin_ts: entry.begin_ts, end_ts: entry.end_ts }),
    )
        .into_response())
}

/// `DELETE /api/v1/admin/capture/{captureId}/delete` — deletes the capture's
/// objects from storage asynchronously; the relational rows are left for a
/// future fresh ingest to overwrite via the fingerprint upsert.
async fn delete_capture(State(state): State<AppState>, Path(capture_id): Path<String>) -> Result<StatusCode, AppError> {
    validate_capture_id(&capture_id)?;
    tokio::spawn(async move {
        if let Err(e) = state.storage.delete_capture(&capture_id).await {
            tracing::warn!(capture_id, error = %e, "capture delete failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

/// `DELETE /api/v1/admin/capture/S3/cleanup` — non-production only; sweeps
/// orphaned incomplete capture groups from the bucket.
async fn cleanup_storage(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.config.production_mode {
        return Err(AppError::InvalidInput("S3 cleanup is not available in production mode".into()));
    }
    tokio::spawn(async move {
        match state.storage.sweep().await {
            Ok(report) => tracing::info!(deleted = report.deleted_groups.len(), kept = report.kept_groups.len(), "storage sweep complete"),
            Err(e) => tracing::warn!(error = %e, "storage sweep failed"),
        }
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct GenerateReportRequest {
    capture_id: String,
    service_name: String,
    service_version: Option<String>,
}

#[derive(Serialize)]
struct GenerateReportResponse {
    id: Uuid,
}

/// `POST /api/v1/report/service/operations/generate` — assigns a
/// `report_uuid`, starts reconciliation as a detached task, and returns the
/// id immediately.
async fn generate_report(State(state): State<AppState>, Json(body): Json<GenerateReportRequest>) -> Result<Response, AppError> {
    if body.capture_id.trim().is_empty() || body.service_name.trim().is_empty() {
        return Err(AppError::InvalidInput("capture_id and service_name are required".into()));
    }

    let report_uuid = Uuid::new_v4();
    let request = ReconciliationRequest {
        capture_id: body.capture_id,
        service_name: body.service_name,
        service_version: body.service_version,
        report_uuid,
    };

    let engine = state.reconciler.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.run(request).await {
            tracing::warn!(report_uuid = %report_uuid, error = %e, "reconciliation failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(GenerateReportResponse { id: report_uuid })).into_response())
}

#[derive(Deserialize)]
struct RenderQuery {
    id: Uuid,
    format: ReportFormat,
}

/// `GET /api/v1/report/service/operations/render` — fetches the report's
/// parameters under a 120s soft timeout, then renders the chosen format. On
/// timeout the in-flight fetch keeps running detached; nothing reads its
/// result, matching the "renderer continues, response is closed" contract.
///
/// Excel can't be streamed (the whole workbook has to exist before it can be
/// written), so its row fetch is also timeout-guarded. JSON streams rows
/// straight off the database cursor once past the parameters fetch, so only
/// that cheap bounded lookup sits inside the timeout.
async fn render_report(State(state): State<AppState>, Query(query): Query<RenderQuery>) -> Result<Response, AppError> {
    let source = state.render_source.clone();
    let report_id = query.id;

    match query.format {
        ReportFormat::Excel => {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let result = fetch_report(&source, report_id).await;
                let _ = tx.send(result);
            });
            let (parameters, rows) = match tokio::time::timeout(RENDER_TIMEOUT, rx).await {
                Ok(Ok(Ok(data))) => data,
                Ok(Ok(Err(e))) => return Err(e.into()),
                Ok(Err(_)) => return Err(AppError::Internal(anyhow::anyhow!("render fetch task was dropped"))),
                Err(_elapsed) => return Err(AppError::Timeout(format!("render of report {report_id} timed out"))),
            };
            render_excel_response(&parameters, rows)
        }
        ReportFormat::Json => {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let result = fetch_parameters_and_id(&source, report_id).await;
                let _ = tx.send(result);
            });
            let (parameters, internal_id) = match tokio::time::timeout(RENDER_TIMEOUT, rx).await {
                Ok(Ok(Ok(data))) => data,
                Ok(Ok(Err(e))) => return Err(e.into()),
                Ok(Err(_)) => return Err(AppError::Internal(anyhow::anyhow!("render fetch task was dropped"))),
                Err(_elapsed) => return Err(AppError::Timeout(format!("render of report {report_id} timed out"))),
            };
            Ok(render_json_response(state.render_source.pool().clone(), internal_id, parameters))
        }
    }
}

async fn fetch_report(source: &ReportRowSource, report_id: Uuid) -> Result<(ReportParameters, Vec<ReportDataRow>), RenderError> {
    let parameters = source.parameters(report_id).await?;
    let rows = source.rows(report_id).await?;
    Ok((parameters, rows))
}

async fn fetch_parameters_and_id(source: &ReportRowSource, report_id: Uuid) -> Result<(ReportParameters, i64), RenderError> {
    let parameters = source.parameters(report_id).await?;
    let internal_id = source.report_id_for(report_id).await?;
    Ok((parameters, internal_id))
}

fn render_excel_response(parameters: &ReportParameters, rows: Vec<ReportDataRow>) -> Result<Response, AppError> {
    let bytes = render_excel(parameters, &rows).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"report.xlsx\""),
        ],
        bytes,
    )
        .into_response())
}

fn render_json_response(pool: sqlx::PgPool, report_id: i64, parameters: ReportParameters) -> Response {
    let body = Body::from_stream(render_json_stream_from_db(pool, report_id, parameters));
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
