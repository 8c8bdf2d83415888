//! PCAP/PCAPNG container reading for the capture ingester (C6).
//!
//! This stays a thin byte source: it hands raw per-packet bytes to
//! [`traffic_analyzer_core::frame::decode_frame`], which does its own
//! link-layer sniffing rather than trusting the capture's declared
//! linktype — so this reader doesn't need to track interface descriptions
//! at all, only packet data blocks.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use pcap_parser::{Block, LegacyPcapReader, PcapBlockOwned, PcapNGReader, traits::PcapReaderIterator};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcapSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
}

pub struct PcapFileSource {
    inner: Reader,
}

enum Reader {
    Legacy(LegacyPcapReader<File>),
    Ng(PcapNGReader<File>),
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, PcapSourceError> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        let inner = if magic == [0x0a, 0x0d, 0x0d, 0x0a] {
            Reader::Ng(PcapNGReader::new(64 * 1024, file).map_err(|e| PcapSourceError::Pcap(e.to_string()))?)
        } else {
            Reader::Legacy(LegacyPcapReader::new(64 * 1024, file).map_err(|e| PcapSourceError::Pcap(e.to_string()))?)
        };
        Ok(Self { inner })
    }

    /// Returns the next packet as `(timestamp_micros, raw_bytes)`, or
    /// `None` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<(i64, Vec<u8>)>, PcapSourceError> {
        match &mut self.inner {
            Reader::Legacy(reader) => loop {
                match reader.next() {
                    Ok((offset, block)) => {
                        let data = match block {
                            PcapBlockOwned::Legacy(packet) => {
                                let ts = packet.ts_sec as i64 * 1_000_000 + packet.ts_usec as i64;
                                Some((ts, packet.data.to_vec()))
                            }
                            _ => None,
                        };
                        reader.consume(offset);
                        if let Some(data) = data {
                            return Ok(Some(data));
                        }
                    }
                    Err(pcap_parser::PcapError::Eof) => return Ok(None),
                    Err(pcap_parser::PcapError::Incomplete(_)) => {
                        reader.refill().map_err(|e| PcapSourceError::Pcap(e.to_string()))?;
                    }
                    Err(e) => return Err(PcapSourceError::Pcap(e.to_string())),
                }
            },
            Reader::Ng(reader) => loop {
                match reader.next() {
                    Ok((offset, block)) => {
                        let data = match block {
                            PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                                let ts = ((packet.ts_high as i64) << 32) | (packet.ts_low as i64);
                                Some((ts, packet.data.to_vec()))
                            }
                            PcapBlockOwned::NG(Block::SimplePacket(packet)) => Some((0, packet.data.to_vec())),
                            _ => None,
                        };
                        reader.consume(offset);
                        if let Some(data) = data {
                            return Ok(Some(data));
                        }
                    }
                    Err(pcap_parser::PcapError::Eof) => return Ok(None),
                    Err(pcap_parser::PcapError::Incomplete(_)) => {
                        reader.refill().map_err(|e| PcapSourceError::Pcap(e.to_string()))?;
                    }
                    Err(e) => return Err(PcapSourceError::Pcap(e.to_string())),
                }
            },
        }
    }
}
