//! Packet store (C5): persists canonicalized HTTP exchanges keyed by the
//! capture-scoped fingerprint, idempotently, and bridges them to their
//! headers via the header dictionary.

use sqlx::PgPool;
use traffic_analyzer_core::model::ServicePacket;

use crate::header_cache::HeaderDictionary;

#[derive(Debug, Clone)]
pub struct ExchangeHeader {
    pub name: String,
    pub value: String,
}

pub struct PacketStore {
    pool: PgPool,
}

impl PacketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Persists one canonicalized exchange and its headers. Returns the
    /// `packet_id`, reusing the existing row when the fingerprint was
    /// already seen.
    pub async fn store_exchange(
        &self,
        packet: &ServicePacket,
        headers: &[ExchangeHeader],
        header_dict: &HeaderDictionary,
    ) -> Result<i64, sqlx::Error> {
        let packet_id = self.upsert_packet(packet).await?;
        for header in headers {
            let header_id = header_dict.get_or_create(&header.name, &header.value).await?;
            sqlx::query(
                "INSERT INTO packet_header (packet_id, header_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(packet_id)
            .bind(&header_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(packet_id)
    }

    async fn upsert_packet(&self, packet: &ServicePacket) -> Result<i64, sqlx::Error> {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT packet_id FROM service_packet
             WHERE capture_id = $1 AND source_peer_id = $2 AND source_port = $3
               AND dest_peer_id = $4 AND dest_port = $5 AND seq_no = $6 AND ack_no = $7 AND \"timestamp\" = $8",
        )
        .bind(&packet.capture_id)
        .bind(packet.source_peer_id)
        .bind(packet.source_port as i32)
        .bind(packet.dest_peer_id)
        .bind(packet.dest_port as i32)
        .bind(packet.seq_no as i64)
        .bind(packet.ack_no as i64)
        .bind(packet.timestamp)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((packet_id,)) = existing {
            return Ok(packet_id);
        }

        let (packet_id,): (i64,) = sqlx::query_as(
            "INSERT INTO service_packet
                (capture_id, source_peer_id, source_port, dest_peer_id, dest_port, \"timestamp\", seq_no, ack_no, body, request_path, request_method)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (capture_id, source_peer_id, source_port, dest_peer_id, dest_port, seq_no, ack_no, \"timestamp\")
             DO UPDATE SET capture_id = EXCLUDED.capture_id
             RETURNING packet_id",
        )
        .bind(&packet.capture_id)
        .bind(packet.source_peer_id)
        .bind(packet.source_port as i32)
        .bind(packet.dest_peer_id)
        .bind(packet.dest_port as i32)
        .bind(packet.timestamp)
        .bind(packet.seq_no as i64)
        .bind(packet.ack_no as i64)
        .bind(&packet.body)
        .bind(&packet.request_path)
        .bind(&packet.request_method)
        .fetch_one(&self.pool)
        .await?;

        Ok(packet_id)
    }

    /// Fetches every persisted exchange for a capture, joined with the
    /// resolved peer labels the reconciliation engine needs.
    pub async fn exchanges_for_capture(
        &self,
        capture_id: &str,
    ) -> Result<Vec<traffic_analyzer_core::reconcile::CapturedExchange>, sqlx::Error> {
        #[allow(clippy::type_complexity)]
        let rows: Vec<(i64, String, String, Option<String>, Option<String>, i32, Option<String>, Option<String>, i32)> = sqlx::query_as(
            "SELECT p.packet_id, p.request_method, p.request_path,
                    src.service_name, src.ip, p.source_port,
                    dst.service_name, dst.ip, p.dest_port
             FROM service_packet p
             LEFT JOIN service_address src ON src.id = p.source_peer_id
             LEFT JOIN service_address dst ON dst.id = p.dest_peer_id
             WHERE p.capture_id = $1",
        )
        .bind(capture_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(packet_id, method, path, src_name, src_ip, src_port, dst_name, dst_ip, dst_port)| {
                let src_peer_label = traffic_analyzer_core::peer_label(src_name.as_deref(), src_ip.as_deref().unwrap_or(""), src_port as u16);
                let dst_peer_label = traffic_analyzer_core::peer_label(dst_name.as_deref(), dst_ip.as_deref().unwrap_or(""), dst_port as u16);
                traffic_analyzer_core::reconcile::CapturedExchange {
                    packet_id,
                    method,
                    path,
                    src_peer_label,
                    dst_peer_label,
                }
            })
            .collect())
    }
}
