//! Peer resolver (C3): binds an observed IP to a logical service identity,
//! scoped to a capture.
//!
//! The in-memory map is keyed by plain IP (not `(ip, capture_id)`) following
//! the hot-path lookup in the original store — a process handles one
//! capture's ingest at a time in practice, and the durable store is what
//! actually scopes by capture. Mutated by the ingest path only; reads may
//! race but `id` is terminal once assigned.

use std::collections::HashMap;
use std::sync::RwLock;

use sqlx::PgPool;
use traffic_analyzer_core::model::ServiceAddress;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct PeerResolver {
    pool: PgPool,
    cache: RwLock<HashMap<String, ServiceAddress>>,
}

impl PeerResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, cache: RwLock::new(HashMap::new()) }
    }

    /// Hot-path lookup against the in-memory map only. Returns `None` if the
    /// IP has never been resolved in this process.
    pub fn lookup_by_ip(&self, ip: &str) -> Option<ServiceAddress> {
        self.cache.read().unwrap().get(ip).cloned()
    }

    /// Upsert semantics: returns the existing row for `(ip, capture_id)` (or
    /// `(ip, name, capture_id)` when `name` is given), promoting the stored
    /// name/version if this call supplies newer information.
    pub async fn resolve(
        &self,
        ip: &str,
        name: Option<&str>,
        version: Option<&str>,
        capture_id: &str,
    ) -> Result<ServiceAddress, PeerError> {
        if let Some(cached) = self.lookup_by_ip(ip) {
            if name.is_none() || cached.service_name.as_deref() == name {
                return Ok(cached);
            }
        }

        let existing: Option<(i64, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT id, service_name, service_version FROM service_address WHERE ip = $1 AND capture_id = $2",
        )
        .bind(ip)
        .bind(capture_id)
        .fetch_optional(&self.pool)
        .await?;

        let resolved = match existing {
            Some((id, existing_name, existing_version)) => {
                let promote_name = existing_name.is_none() && name.is_some();
                let promote_version = name.is_some() && version.is_some() && existing_version.as_deref() != version;
                if promote_name || promote_version {
                    sqlx::query(
                        "UPDATE service_address SET service_name = COALESCE(service_name, $1), service_version = COALESCE($2, service_version) WHERE id = $3",
                    )
                    .bind(name)
                    .bind(version)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                }
                ServiceAddress {
                    id,
                    ip: ip.to_string(),
                    service_name: name.map(str::to_string).or(existing_name),
                    service_version: version.map(str::to_string).or(existing_version),
                    capture_id: capture_id.to_string(),
                }
            }
            None => {
                let (id,): (i64,) = sqlx::query_as(
                    "INSERT INTO service_address (ip, service_name, service_version, capture_id) VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .bind(ip)
                .bind(name)
                .bind(version)
                .bind(capture_id)
                .fetch_one(&self.pool)
                .await?;
                ServiceAddress {
                    id,
                    ip: ip.to_string(),
                    service_name: name.map(str::to_string),
                    service_version: version.map(str::to_string),
                    capture_id: capture_id.to_string(),
                }
            }
        };

        self.cache.write().unwrap().insert(ip.to_string(), resolved.clone());
        Ok(resolved)
    }
}
