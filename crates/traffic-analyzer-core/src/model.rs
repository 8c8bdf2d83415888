//! Core data model shared by the ingest and reconciliation paths.
//!
//! These types mirror the relational schema the server persists to, but
//! carry no storage concerns themselves — construction and validation only.

use serde::{Deserialize, Serialize};

/// A resolved `(ip, service)` binding scoped to a single capture.
///
/// Unique per `(ip, service_name, capture_id)`. `id` is terminal once
/// assigned by the store; callers never need to re-resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub id: i64,
    pub ip: String,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub capture_id: String,
}

impl ServiceAddress {
    /// Peer label used in report rows: the service name if known, else `ip:port`.
    pub fn label(&self, port: u16) -> String {
        peer_label(self.service_name.as_deref(), &self.ip, port)
    }
}

/// Peer label used in report rows: `service_name` if known and non-empty,
/// else `ip:port`. Shared by [`ServiceAddress::label`] and any query result
/// that only has the name/ip columns on hand, not a full `ServiceAddress`.
pub fn peer_label(service_name: Option<&str>, ip: &str, port: u16) -> String {
    match service_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{ip}:{port}"),
    }
}

/// Content-addressed HTTP header. `id` is `md5(name || value)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// A canonicalized HTTP exchange as persisted by the packet store.
///
/// `request_path` / `request_method` double as the status line for response
/// records — there is no separate role column (see the open design note on
/// this in the project's design ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePacket {
    pub packet_id: i64,
    pub capture_id: String,
    pub source_peer_id: i64,
    pub source_port: u16,
    pub dest_peer_id: i64,
    pub dest_port: u16,
    pub timestamp: i64,
    pub seq_no: u32,
    pub ack_no: u32,
    pub body: Vec<u8>,
    pub request_path: String,
    pub request_method: String,
}

/// Peer id used when a source or destination IP could not be resolved.
pub const UNKNOWN_PEER_ID: i64 = 0;

/// `(capture_id, metadata_blob)`. At most one per capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub capture_id: String,
    pub metadata_blob: serde_json::Value,
}

/// Declared version-selection tag recorded on a [`ReportParameters`].
///
/// Distinct from the upstream source, which assigns both cases the literal
/// `"requested"` — that collapse looked like a copy-paste slip rather than
/// intent, so it is corrected here; see the design ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Recent,
    Requested,
}

impl VersionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionStatus::Recent => "recent",
            VersionStatus::Requested => "requested",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Created,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Excel,
    Json,
}

/// Parameters sheet / JSON `parameters` object for a rendered report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportParameters {
    pub report_type: String,
    pub capture_id: String,
    pub service_name: String,
    pub service_version: String,
    pub version_status: VersionStatus,
    pub requested_at: String,
    pub completed_at: Option<String>,
}

/// A single row of the `Data` sheet / JSON `data` array.
///
/// Columns in spec order: Sender, Receiver, Method, Path, Operation-id,
/// Count, Comment. `operation_id` is empty for `Extra` rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDataRow {
    pub sender: String,
    pub receiver: String,
    pub method: String,
    pub path: String,
    pub operation_id: String,
    pub count: u64,
    pub comment: RowComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowComment {
    Found,
    NotFound,
    Extra,
}

impl RowComment {
    pub fn as_str(self) -> &'static str {
        match self {
            RowComment::Found => "Found",
            RowComment::NotFound => "Not Found",
            RowComment::Extra => "Extra",
        }
    }
}

/// Sort key matching the spec's materialization order:
/// `(path, method, src_peer, dst_peer, operation_id)`.
pub fn row_sort_key(row: &ReportDataRow) -> (String, String, String, String, String) {
    (
        row.path.clone(),
        row.method.clone(),
        row.sender.clone(),
        row.receiver.clone(),
        row.operation_id.clone(),
    )
}
