//! Link-layer / network-layer / transport-layer decoding (C1).
//!
//! Recognizes Linux cooked capture (SLL) frames first, falling back to
//! Ethernet II, then parses IPv4 or IPv6 and requires a TCP payload. Frames
//! that don't fit this shape are rejected silently — they are not malformed,
//! just out of scope (UDP, ARP, short frames, exotic ethertypes).

use std::net::IpAddr;

use etherparse::{Ethernet2Header, IpNumber, Ipv4Header, Ipv6Header, TcpHeader};
use thiserror::Error;

const ETHERNET_MIN_LEN: usize = 14;
const SLL_MIN_LEN: usize = 16;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
/// SLL `packet_type` values defined for host/broadcast/multicast/otherhost/outgoing.
const SLL_PACKET_TYPE_MAX: u16 = 4;

/// A decoder failure on a frame whose length looked plausible. Callers log
/// this at trace level and skip the frame; it is never fatal to the ingest
/// loop.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed ethernet header: {0}")]
    Ethernet(String),
    #[error("malformed ipv4 header: {0}")]
    Ipv4(String),
    #[error("malformed ipv6 header: {0}")]
    Ipv6(String),
    #[error("malformed tcp header: {0}")]
    Tcp(String),
}

/// The TCP 5-tuple plus the sequencing fields the packet store's fingerprint
/// relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub seq_no: u32,
    pub ack_no: u32,
}

/// A frame that decoded down to a TCP payload.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub five_tuple: FiveTuple,
    pub payload: Vec<u8>,
}

/// Attempts to decode a captured frame down to its TCP payload.
///
/// Returns `Ok(None)` for frames that are too short, carry an unsupported
/// ethertype, or wrap a non-TCP IP payload — all silent rejections per
/// design. Returns `Err` only when headers are present but fail to parse.
pub fn decode_frame(data: &[u8]) -> Result<Option<DecodedFrame>, FrameError> {
    if let Some((ethertype, rest)) = sniff_sll(data) {
        return decode_network_layer(ethertype, rest);
    }
    if data.len() < ETHERNET_MIN_LEN {
        return Ok(None);
    }
    let (eth, rest) = match Ethernet2Header::from_slice(data) {
        Ok(v) => v,
        Err(e) => return Err(FrameError::Ethernet(e.to_string())),
    };
    decode_network_layer(eth.ether_type.0, rest)
}

/// Probes for a Linux cooked capture header. Returns the ethertype and the
/// remaining bytes if the packet type and ethertype both look plausible.
fn sniff_sll(data: &[u8]) -> Option<(u16, &[u8])> {
    if data.len() < SLL_MIN_LEN {
        return None;
    }
    let packet_type = u16::from_be_bytes([data[0], data[1]]);
    if packet_type > SLL_PACKET_TYPE_MAX {
        return None;
    }
    let ethertype = u16::from_be_bytes([data[14], data[15]]);
    if ethertype != ETHERTYPE_IPV4 && ethertype != ETHERTYPE_IPV6 {
        return None;
    }
    Some((ethertype, &data[SLL_MIN_LEN..]))
}

fn decode_network_layer(ethertype: u16, rest: &[u8]) -> Result<Option<DecodedFrame>, FrameError> {
    match ethertype {
        ETHERTYPE_IPV4 => decode_ipv4(rest),
        ETHERTYPE_IPV6 => decode_ipv6(rest),
        _ => Ok(None),
    }
}

fn decode_ipv4(data: &[u8]) -> Result<Option<DecodedFrame>, FrameError> {
    let (header, rest) = match Ipv4Header::from_slice(data) {
        Ok(v) => v,
        Err(e) => return Err(FrameError::Ipv4(e.to_string())),
    };
    if header.protocol != IpNumber::TCP {
        return Ok(None);
    }
    let src_ip = IpAddr::from(header.source);
    let dst_ip = IpAddr::from(header.destination);
    decode_tcp(src_ip, dst_ip, rest)
}

fn decode_ipv6(data: &[u8]) -> Result<Option<DecodedFrame>, FrameError> {
    let (header, rest) = match Ipv6Header::from_slice(data) {
        Ok(v) => v,
        Err(e) => return Err(FrameError::Ipv6(e.to_string())),
    };
    if header.next_header != IpNumber::TCP {
        return Ok(None);
    }
    let src_ip = IpAddr::from(header.source);
    let dst_ip = IpAddr::from(header.destination);
    decode_tcp(src_ip, dst_ip, rest)
}

fn decode_tcp(src_ip: IpAddr, dst_ip: IpAddr, data: &[u8]) -> Result<Option<DecodedFrame>, FrameError> {
    let (header, payload) = match TcpHeader::from_slice(data) {
        Ok(v) => v,
        Err(e) => return Err(FrameError::Tcp(e.to_string())),
    };
    Ok(Some(DecodedFrame {
        five_tuple: FiveTuple {
            src_ip,
            src_port: header.source_port,
            dst_ip,
            dst_port: header.destination_port,
            seq_no: header.sequence_number,
            ack_no: header.acknowledgment_number,
        },
        payload: payload.to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_frame_silently() {
        let data = [0u8; 10];
        assert!(decode_frame(&data).unwrap().is_none());
    }

    #[test]
    fn sll_probe_rejects_unsupported_ethertype() {
        let mut data = vec![0u8; SLL_MIN_LEN];
        data[0] = 0;
        data[1] = 0;
        // ARP, not IPv4/IPv6
        data[14] = 0x08;
        data[15] = 0x06;
        assert!(sniff_sll(&data).is_none());
    }

    #[test]
    fn sll_probe_accepts_ipv4_ethertype() {
        let mut data = vec![0u8; SLL_MIN_LEN + 4];
        data[0] = 0;
        data[1] = 0;
        data[14] = 0x08;
        data[15] = 0x00;
        let (ethertype, rest) = sniff_sll(&data).expect("should sniff");
        assert_eq!(ethertype, ETHERTYPE_IPV4);
        assert_eq!(rest.len(), 4);
    }
}
