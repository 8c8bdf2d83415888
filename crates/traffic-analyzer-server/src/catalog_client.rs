//! Catalog client: the external package/operations REST API the
//! reconciliation engine reads declared operations from.
//!
//! TLS verification is intentionally disabled here, carried forward from the
//! deployment this was distilled from rather than silently "fixed" — see
//! the open question recorded in the design ledger.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

const OPERATIONS_PAGE_SIZE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("request to catalog failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("catalog rejected credentials")]
    Unauthorized,
    #[error("catalog returned unexpected status {0}")]
    Upstream(StatusCode),
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub id: String,
    pub name: String,
    pub last_release_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestOperation {
    pub operation_id: String,
    pub path: String,
    pub method: String,
}

#[derive(Debug, Deserialize)]
struct PackageDto {
    #[serde(rename = "packageId")]
    package_id: String,
    name: String,
    #[serde(rename = "lastReleaseVersionDetails")]
    last_release_version_details: Option<LastReleaseVersionDetailsDto>,
}

#[derive(Debug, Deserialize)]
struct LastReleaseVersionDetailsDto {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackagesDto {
    packages: Vec<PackageDto>,
}

#[derive(Debug, Deserialize)]
struct OperationDto {
    #[serde(rename = "operationId")]
    operation_id: String,
    path: String,
    method: String,
}

#[derive(Debug, Deserialize)]
struct OperationsDto {
    operations: Vec<OperationDto>,
}

pub enum Credential {
    Bearer(String),
    ApiKey(String),
}

pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

impl CatalogClient {
    pub fn new(base_url: String, credential: Option<Credential>) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, base_url, credential })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credential {
            Some(Credential::Bearer(token)) => req.bearer_auth(token),
            Some(Credential::ApiKey(key)) => req.header("X-Api-Key", key),
            None => req,
        }
    }

    fn check_auth(resp: &reqwest::Response) -> Result<(), CatalogError> {
        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            return Err(CatalogError::Unauthorized);
        }
        Ok(())
    }

    /// Resolves the package for a service by name, including its last
    /// released version. Returns `None` on a 404 — "no such package" is not
    /// an error condition the caller needs to propagate.
    pub async fn find_package_by_service(&self, service_name: &str) -> Result<Option<PackageInfo>, CatalogError> {
        let url = format!("{}/api/v2/packages", self.base_url);
        let resp = self
            .authorize(self.http.get(&url))
            .query(&[("serviceName", service_name), ("kind", "package"), ("lastReleaseVersionDetails", "true")])
            .send()
            .await?;
        Self::check_auth(&resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CatalogError::Upstream(resp.status()));
        }
        let body: PackagesDto = resp.json().await?;
        Ok(body.packages.into_iter().next().map(|p| PackageInfo {
            id: p.package_id,
            name: p.name,
            last_release_version: p.last_release_version_details.and_then(|d| d.version),
        }))
    }

    /// Pages through a package version's REST operations at a fixed page
    /// size until a short page signals the end.
    pub async fn fetch_all_operations(&self, package_id: &str, version: &str) -> Result<Vec<RestOperation>, CatalogError> {
        let mut page = 0u32;
        let mut all = Vec::new();
        loop {
            let batch = self.fetch_operations_page(package_id, version, page).await?;
            let got = batch.len() as u32;
            all.extend(batch);
            if got < OPERATIONS_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    async fn fetch_operations_page(&self, package_id: &str, version: &str, page: u32) -> Result<Vec<RestOperation>, CatalogError> {
        let url = format!("{}/api/v2/packages/{package_id}/versions/{version}/rest/operations", self.base_url);
        let resp = self
            .authorize(self.http.get(&url))
            .query(&[("includeData", "true"), ("limit", &OPERATIONS_PAGE_SIZE.to_string()), ("page", &page.to_string())])
            .send()
            .await?;
        Self::check_auth(&resp)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(CatalogError::Upstream(resp.status()));
        }
        let body: OperationsDto = resp.json().await?;
        Ok(body
            .operations
            .into_iter()
            .map(|o| RestOperation { operation_id: o.operation_id, path: o.path, method: o.method })
            .collect())
    }
}
