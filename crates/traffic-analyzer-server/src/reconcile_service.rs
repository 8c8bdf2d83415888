//! Reconciliation engine orchestration (C9): wires the catalog client and
//! packet store to the pure matching/materialization logic, and owns the
//! report lifecycle (`created` → `ready` | `failed`).

use sqlx::PgPool;
use tracing::Level;
use uuid::Uuid;

use traffic_analyzer_core::model::{ReportDataRow, VersionStatus};
use traffic_analyzer_core::reconcile::{DeclaredOperation, affected_pairs, materialize_rows, operation_outcomes};

use crate::catalog_client::{CatalogClient, CatalogError};
use crate::error::AppError;
use crate::packets::PacketStore;

/// Maps an upstream catalog auth failure to the 424 the HTTP surface
/// expects; every other catalog error still becomes a plain 500 via
/// `AppError`'s blanket `#[from]` conversion.
fn map_catalog_error(e: CatalogError) -> AppError {
    match e {
        CatalogError::Unauthorized => AppError::NoCatalogAccess,
        other => AppError::Catalog(other),
    }
}

pub struct ReconciliationRequest {
    pub capture_id: String,
    pub service_name: String,
    pub service_version: Option<String>,
    pub report_uuid: Uuid,
}

pub struct ReconciliationEngine {
    pool: PgPool,
    catalog: CatalogClient,
    packets: PacketStore,
}

impl ReconciliationEngine {
    pub fn new(pool: PgPool, catalog: CatalogClient, packets: PacketStore) -> Self {
        Self { pool, catalog, packets }
    }

    pub async fn run(&self, req: ReconciliationRequest) -> Result<(), AppError> {
        let package = self
            .catalog
            .find_package_by_service(&req.service_name)
            .await
            .map_err(map_catalog_error)?
            .ok_or_else(|| AppError::MissingResource(format!("no catalog package for service {}", req.service_name)))?;

        let (version, version_status) = match &req.service_version {
            Some(v) => (v.clone(), VersionStatus::Requested),
            None => {
                let v = package
                    .last_release_version
                    .clone()
                    .ok_or_else(|| AppError::MissingResource("package has no last release version".into()))?;
                (v, VersionStatus::Recent)
            }
        };

        let report_id = self.create_report(&req, &version, version_status).await?;

        match self.reconcile_inner(report_id, &req.capture_id, &package.id, &version).await {
            Ok(()) => {
                self.transition(report_id, "ready").await?;
                Ok(())
            }
            Err(e) => {
                self.transition(report_id, "failed").await?;
                Err(e)
            }
        }
    }

    async fn create_report(
        &self,
        req: &ReconciliationRequest,
        version: &str,
        version_status: VersionStatus,
    ) -> Result<i64, AppError> {
        let parameters = serde_json::json!({
            "reportType": "service_operations",
            "captureId": req.capture_id,
            "serviceName": req.service_name,
            "serviceVersion": version,
            "versionStatus": version_status.as_str(),
        });
        let (report_id,): (i64,) = sqlx::query_as(
            "INSERT INTO report (report_uuid, report_type, status, parameters_json) VALUES ($1, 'service_operations', 'created', $2) RETURNING report_id",
        )
        .bind(req.report_uuid)
        .bind(parameters)
        .fetch_one(&self.pool)
        .await?;
        Ok(report_id)
    }

    async fn transition(&self, report_id: i64, status: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE report SET status = $1, completed_at = now() WHERE report_id = $2")
            .bind(status)
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Steps 4-8 of the reconciliation design: fetch declared operations,
    /// match against stored exchanges, persist intermediates, materialize
    /// final rows. Any failure here leaves the report `created` with
    /// whatever intermediates were written, for inspection — the caller
    /// transitions to `failed` around this call.
    async fn reconcile_inner(&self, report_id: i64, capture_id: &str, package_id: &str, version: &str) -> Result<(), AppError> {
        let catalog_ops = self.catalog.fetch_all_operations(package_id, version).await.map_err(map_catalog_error)?;
        let declared: Vec<DeclaredOperation> = catalog_ops
            .into_iter()
            .map(|o| DeclaredOperation { operation_id: o.operation_id, path: o.path, method: o.method })
            .collect();

        let exchanges = self.packets.exchanges_for_capture(capture_id).await?;

        let outcomes = operation_outcomes(&declared, &exchanges);
        for outcome in &outcomes {
            let status = match outcome.status {
                traffic_analyzer_core::reconcile::OperationStatus::Found => "found",
                traffic_analyzer_core::reconcile::OperationStatus::NotFound => "not_found",
            };
            let op = declared.iter().find(|o| o.operation_id == outcome.operation_id).unwrap();
            sqlx::query(
                "INSERT INTO report_declared_operation (report_id, operation_id, path, method, status, hit_count)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (report_id, operation_id) DO UPDATE SET status = EXCLUDED.status, hit_count = EXCLUDED.hit_count",
            )
            .bind(report_id)
            .bind(&outcome.operation_id)
            .bind(&op.path)
            .bind(&op.method)
            .bind(status)
            .bind(outcome.hit_count as i64)
            .execute(&self.pool)
            .await?;
        }

        for (operation_id, packet_id) in affected_pairs(&declared, &exchanges) {
            sqlx::query(
                "INSERT INTO report_affected_packet (report_id, operation_id, packet_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(report_id)
            .bind(operation_id)
            .bind(packet_id)
            .execute(&self.pool)
            .await?;
        }

        let rows = materialize_rows(&declared, &exchanges);
        for row in &rows {
            self.persist_row(report_id, row).await?;
        }

        if !tracing::enabled!(Level::DEBUG) {
            sqlx::query("DELETE FROM report_declared_operation WHERE report_id = $1").bind(report_id).execute(&self.pool).await?;
            sqlx::query("DELETE FROM report_affected_packet WHERE report_id = $1").bind(report_id).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn persist_row(&self, report_id: i64, row: &ReportDataRow) -> Result<(), AppError> {
        let row_json = serde_json::to_value(row).map_err(|e| AppError::Internal(e.into()))?;
        sqlx::query("INSERT INTO report_row (report_id, row_json) VALUES ($1, $2)")
            .bind(report_id)
            .bind(row_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
