//! Capture ingester (C6): orchestrates C1 (frame decoder) through C5
//! (packet store) over a PCAP file or a directory of sidecar files.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tokio::task;

use traffic_analyzer_core::frame::decode_frame;
use traffic_analyzer_core::http::{self, PayloadType};
use traffic_analyzer_core::model::{ServicePacket, UNKNOWN_PEER_ID};

use crate::header_cache::HeaderDictionary;
use crate::packets::{ExchangeHeader, PacketStore};
use crate::pcap_reader::PcapFileSource;
use crate::peers::PeerResolver;

static ADDRESS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-fA-F0-9.:]+)\s+(\{.+\})\s*$").unwrap());

#[derive(Debug, Deserialize)]
struct AddressListEntry {
    name: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestCounters {
    pub total_frames: u64,
    pub http_frames: u64,
    pub persisted: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Pcap(#[from] crate::pcap_reader::PcapSourceError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Peer(#[from] crate::peers::PeerError),
    #[error(transparent)]
    Join(#[from] task::JoinError),
}

pub struct Ingester {
    pub peers: PeerResolver,
    pub headers: std::sync::Arc<HeaderDictionary>,
    pub packets: PacketStore,
}

impl Ingester {
    /// Ingests a single PCAP file, inflating it first if it ends in `.gz`
    /// (the reader needs random-access seeking).
    pub async fn ingest_file(&self, capture_id: &str, path: &Path, work_dir: &Path) -> Result<IngestCounters, IngestError> {
        let pcap_path = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            gunzip_to(path, work_dir)?
        } else {
            path.to_path_buf()
        };

        let mut source = PcapFileSource::open(&pcap_path)?;
        let mut counters = IngestCounters::default();

        while let Some((ts, raw)) = source.next_packet()? {
            counters.total_frames += 1;
            let Some(decoded) = decode_frame(&raw).unwrap_or_else(|e| {
                tracing::trace!(error = %e, "frame decode failed, skipping");
                None
            }) else {
                continue;
            };

            let kind = http::classify(&decoded.payload);
            if matches!(kind, PayloadType::NotHttp | PayloadType::HttpLike { .. }) {
                continue;
            }
            counters.http_frames += 1;

            let Ok(parsed) = http::parse_message(&decoded.payload, &kind) else { continue };

            // Hot path: look up peers already known from the address-list import
            // or an earlier packet in this capture. Never upserts — an IP the
            // address list never named stays an unresolved peer-id-0 row, it
            // does not get written to `service_address` just for being seen.
            let src_peer_id = self.peers.lookup_by_ip(&decoded.five_tuple.src_ip.to_string()).map(|p| p.id).unwrap_or(UNKNOWN_PEER_ID);
            let dst_peer_id = self.peers.lookup_by_ip(&decoded.five_tuple.dst_ip.to_string()).map(|p| p.id).unwrap_or(UNKNOWN_PEER_ID);

            let (request_method, request_path) = match &parsed.line {
                traffic_analyzer_core::http::MessageLine::Request { method, path, .. } => (method.clone(), path.clone()),
                // response rows carry the status line in the same columns, there is no role column
                traffic_analyzer_core::http::MessageLine::Response { status, reason, .. } => (status.to_string(), reason.clone()),
            };

            let packet = ServicePacket {
                packet_id: 0,
                capture_id: capture_id.to_string(),
                source_peer_id: src_peer_id,
                source_port: decoded.five_tuple.src_port,
                dest_peer_id: dst_peer_id,
                dest_port: decoded.five_tuple.dst_port,
                timestamp: ts,
                seq_no: decoded.five_tuple.seq_no,
                ack_no: decoded.five_tuple.ack_no,
                body: parsed.body,
                request_path,
                request_method,
            };

            let headers: Vec<ExchangeHeader> = parsed
                .headers
                .iter()
                .map(|h| ExchangeHeader { name: h.name.clone(), value: h.value.clone() })
                .collect();

            self.packets.store_exchange(&packet, &headers, &self.headers).await?;
            counters.persisted += 1;
        }

        Ok(counters)
    }

    /// Ingests a capture directory: address lists first, then metadata,
    /// then PCAPs, matching the design's ordering so peers are known by the
    /// time packets are parsed.
    pub async fn ingest_directory(&self, capture_id: &str, dir: &Path, work_dir: &Path) -> Result<IngestCounters, IngestError> {
        let mut address_lists = Vec::new();
        let mut metadata_files = Vec::new();
        let mut pcaps = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = std::fs::canonicalize(entry.path())?; // dereference symlinks once
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.starts_with(capture_id) {
                continue;
            }
            let stripped = name.strip_suffix(".gz").unwrap_or(name);
            if stripped.ends_with("_address_list.txt") {
                address_lists.push(path);
            } else if stripped.ends_with("_metadata.json") {
                metadata_files.push(path);
            } else if stripped.ends_with(".pcap") {
                pcaps.push(path);
            }
        }

        for path in &address_lists {
            self.ingest_address_list(capture_id, path, work_dir).await?;
        }
        for path in &metadata_files {
            self.ingest_metadata(capture_id, path, work_dir).await?;
        }

        let mut totals = IngestCounters::default();
        for path in &pcaps {
            let counters = Box::pin(self.ingest_file(capture_id, path, work_dir)).await?;
            totals.total_frames += counters.total_frames;
            totals.http_frames += counters.http_frames;
            totals.persisted += counters.persisted;
        }
        Ok(totals)
    }

    async fn ingest_address_list(&self, capture_id: &str, path: &Path, work_dir: &Path) -> Result<(), IngestError> {
        let text = read_maybe_gzipped(path, work_dir)?;
        for line in text.lines() {
            let Some(caps) = ADDRESS_LINE.captures(line) else { continue };
            let ip = &caps[1];
            let Ok(entry) = serde_json::from_str::<AddressListEntry>(&caps[2]) else { continue };
            self.peers.resolve(ip, entry.name.as_deref(), entry.version.as_deref(), capture_id).await?;
        }
        Ok(())
    }

    async fn ingest_metadata(&self, capture_id: &str, path: &Path, work_dir: &Path, ) -> Result<(), IngestError> {
        let text = read_maybe_gzipped(path, work_dir)?;
        let blob: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO capture_metadata (capture_id, metadata_blob) VALUES ($1, $2)
             ON CONFLICT (capture_id) DO UPDATE SET metadata_blob = EXCLUDED.metadata_blob",
        )
        .bind(capture_id)
        .bind(blob)
        .execute(self.packets.pool())
        .await?;
        Ok(())
    }
}

fn read_maybe_gzipped(path: &Path, work_dir: &Path) -> Result<String, IngestError> {
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let local = gunzip_to(path, work_dir)?;
        Ok(std::fs::read_to_string(local)?)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn gunzip_to(path: &Path, work_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let mut decoder = flate2::read::GzDecoder::new(std::fs::File::open(path)?);
    let mut contents = Vec::new();
    decoder.read_to_end(&mut contents)?;
    let file_name = path.file_stem().and_then(|n| n.to_str()).unwrap_or("capture").to_string();
    let out_path = work_dir.join(file_name);
    std::fs::write(&out_path, contents)?;
    Ok(out_path)
}
