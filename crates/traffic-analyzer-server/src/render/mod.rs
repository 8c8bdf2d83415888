//! Report renderer (C10): streams a completed report's rows to Excel or
//! JSON. Both formats read rows via the same ordered query; only the
//! serialization differs.

mod excel;
mod json;

pub use excel::render_excel;
pub use json::render_json_stream_from_db;

use sqlx::PgPool;
use uuid::Uuid;

use traffic_analyzer_core::model::{ReportDataRow, ReportParameters, VersionStatus};

use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Excel(#[from] rust_xlsxwriter::XlsxError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("report {0} is not ready")]
    NotReady(String),
}

pub struct ReportRowSource {
    pool: PgPool,
}

impl ReportRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn parameters(&self, report_uuid: Uuid) -> Result<ReportParameters, RenderError> {
        let row: Option<(String, serde_json::Value, String, Option<time::OffsetDateTime>, time::OffsetDateTime)> = sqlx::query_as(
            "SELECT status, parameters_json, report_type, completed_at, created_at FROM report WHERE report_uuid = $1",
        )
        .bind(report_uuid)
        .fetch_optional(&self.pool)
        .await?;
        let Some((status, params, report_type, completed_at, created_at)) = row else {
            return Err(RenderError::NotReady(report_uuid.to_string()));
        };
        if status != "ready" {
            return Err(RenderError::NotReady(report_uuid.to_string()));
        }
        let version_status = match params.get("versionStatus").and_then(|v| v.as_str()) {
            Some("recent") => VersionStatus::Recent,
            _ => VersionStatus::Requested,
        };
        Ok(ReportParameters {
            report_type,
            capture_id: params.get("captureId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            service_name: params.get("serviceName").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            service_version: params.get("serviceVersion").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            version_status,
            requested_at: created_at.to_string(),
            completed_at: completed_at.map(|t| t.to_string()),
        })
    }

    pub async fn rows(&self, report_uuid: Uuid) -> Result<Vec<ReportDataRow>, RenderError> {
        let report_id = self.report_id_for(report_uuid).await?;
        let raw: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT row_json FROM report_row WHERE report_id = $1 ORDER BY report_row_id",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;
        raw.into_iter()
            .map(|(v,)| serde_json::from_value(v).map_err(RenderError::from))
            .collect()
    }

    /// Resolves the internal `report_id` a report's rows are keyed by.
    /// Cheap, bounded lookup — safe to run under the render timeout even
    /// for a format that then streams its rows unbounded.
    pub async fn report_id_for(&self, report_uuid: Uuid) -> Result<i64, RenderError> {
        let report_id: Option<(i64,)> = sqlx::query_as("SELECT report_id FROM report WHERE report_uuid = $1")
            .bind(report_uuid)
            .fetch_optional(&self.pool)
            .await?;
        report_id.map(|(id,)| id).ok_or_else(|| RenderError::NotReady(report_uuid.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::NotReady(id) => AppError::MissingResource(format!("report {id} not ready")),
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}
