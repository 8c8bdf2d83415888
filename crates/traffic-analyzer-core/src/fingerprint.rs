//! Packet idempotency fingerprint (C5, pure half).
//!
//! The fingerprint deliberately excludes `body` — two packets agreeing on
//! every other field are the same exchange even if body capture differs
//! (e.g. one run captured a compressed body, a retry captured truncated
//! bytes of it).

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PacketFingerprint {
    pub capture_id: String,
    pub source_peer_id: i64,
    pub source_port: u16,
    pub dest_peer_id: i64,
    pub dest_port: u16,
    pub seq_no: u32,
    pub ack_no: u32,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample(ts: i64) -> PacketFingerprint {
        PacketFingerprint {
            capture_id: "cap1".into(),
            source_peer_id: 1,
            source_port: 5000,
            dest_peer_id: 2,
            dest_port: 8080,
            seq_no: 100,
            ack_no: 200,
            timestamp: ts,
        }
    }

    #[test]
    fn identical_fields_collide_ignoring_body() {
        let mut set = HashSet::new();
        set.insert(sample(1));
        assert!(!set.insert(sample(1)), "re-inserting the same fingerprint must be a no-op");
    }

    #[test]
    fn differing_timestamp_is_a_distinct_fingerprint() {
        let mut set = HashSet::new();
        set.insert(sample(1));
        assert!(set.insert(sample(2)));
    }
}
