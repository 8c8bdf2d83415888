//! Pure capture-ingestion and operation-reconciliation logic.
//!
//! This crate has no I/O beyond reading bytes already in memory: no
//! database, no object storage, no network clients, no async runtime. It
//! covers frame decoding, HTTP detection/parsing, the shared data model,
//! header and packet fingerprinting, and the declared-operation matching and
//! row materialization that sit at the heart of reconciliation. Everything
//! with a database, a bucket, or an HTTP listener attached lives in the
//! server crate, which depends on this one.

pub mod fingerprint;
pub mod frame;
pub mod headers;
pub mod http;
pub mod model;
pub mod path_template;
pub mod reconcile;

pub use fingerprint::PacketFingerprint;
pub use frame::{DecodedFrame, FiveTuple, FrameError, decode_frame};
pub use http::{HeaderField, HttpParseError, MessageLine, ParsedMessage, PayloadType, classify, parse_message};
pub use model::{
    CaptureMetadata, HttpHeader, ReportDataRow, ReportFormat, ReportParameters, ReportStatus,
    RowComment, ServiceAddress, ServicePacket, UNKNOWN_PEER_ID, VersionStatus, peer_label,
};
pub use path_template::{PathMatcher, build_path_pattern};
pub use reconcile::{
    CapturedExchange, DeclaredOperation, OperationOutcome, OperationStatus, affected_pairs, assign_operations,
    materialize_rows, operation_outcomes,
};
