//! HTTP message detection and best-effort parsing (C2).
//!
//! Detection is ordered: a request line, then a status line, then a bare
//! search for the literal `HTTP` marker. Only request/response payloads are
//! parsed further; `HttpLike` carries just the marker offset for callers
//! that want to log or count near-misses.

use std::io::Read;

use flate2::read::GzDecoder;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static REQUEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Z]+)\s+(\S+)\s+HTTP/\d\.\d\s").unwrap());
static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*HTTP/\d\.\d\s+(\d{3})\s+([^\r\n]*?)\s").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadType {
    NotHttp,
    Request { method: String, path: String },
    Response { status: u16, reason: String },
    HttpLike { offset: usize },
}

/// Classifies a TCP payload per the detection order in the design.
pub fn classify(payload: &[u8]) -> PayloadType {
    let text = String::from_utf8_lossy(payload);
    if let Some(caps) = REQUEST_LINE.captures(&text) {
        return PayloadType::Request {
            method: caps[1].to_string(),
            path: caps[2].to_string(),
        };
    }
    if let Some(caps) = STATUS_LINE.captures(&text) {
        if let Ok(status) = caps[1].parse::<u16>() {
            return PayloadType::Response {
                status,
                reason: caps[2].trim().to_string(),
            };
        }
    }
    if let Some(offset) = find_http_marker(payload) {
        return PayloadType::HttpLike { offset };
    }
    PayloadType::NotHttp
}

fn find_http_marker(payload: &[u8]) -> Option<usize> {
    payload.windows(4).position(|w| w == b"HTTP")
}

#[derive(Debug, Error)]
pub enum HttpParseError {
    #[error("payload does not contain a header/body separator")]
    NoHeaderBoundary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLine {
    Request { method: String, path: String, version: String },
    Response { version: String, status: u16, reason: String },
}

/// A single flattened header: repeated header names are joined with `\n`,
/// which is lossy for values that themselves contain newlines (see the
/// design ledger's note on this).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub line: MessageLine,
    pub headers: Vec<HeaderField>,
    pub body: Vec<u8>,
}

/// Parses a request/response payload already classified as `Request` or
/// `Response` by [`classify`]. Body decoding is gzip-transparent and
/// tolerant of truncation: a partial capture never turns into a parse
/// error, it just yields a partial or raw body.
pub fn parse_message(payload: &[u8], kind: &PayloadType) -> Result<ParsedMessage, HttpParseError> {
    let (header_block, body_raw) = split_header_block(payload).ok_or(HttpParseError::NoHeaderBoundary)?;
    let mut lines = header_block.split(|&b| b == b'\n');
    let start_line = lines.next().unwrap_or(&[]);
    let start_line_text = String::from_utf8_lossy(start_line);

    let line = match kind {
        PayloadType::Request { method, path } => MessageLine::Request {
            method: method.clone(),
            path: path.clone(),
            version: extract_version(&start_line_text),
        },
        PayloadType::Response { status, reason } => MessageLine::Response {
            version: extract_version(&start_line_text),
            status: *status,
            reason: reason.clone(),
        },
        _ => {
            return Err(HttpParseError::NoHeaderBoundary);
        }
    };

    let headers = parse_headers(lines);
    let content_length = headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| h.value.trim().parse::<usize>().ok());
    let is_gzip = headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case("content-encoding") && h.value.to_ascii_lowercase().contains("gzip"));

    // Unexpected EOF reading the body (a partial capture cut the payload
    // short of the declared Content-Length) is not an error: take what's
    // available.
    let body_slice = match content_length {
        Some(len) if len < body_raw.len() => &body_raw[..len],
        _ => body_raw,
    };

    let body = if is_gzip {
        decode_gzip_best_effort(body_slice)
    } else {
        body_slice.to_vec()
    };

    Ok(ParsedMessage { line, headers, body })
}

fn extract_version(start_line: &str) -> String {
    start_line
        .split_whitespace()
        .find(|tok| tok.starts_with("HTTP/"))
        .unwrap_or("HTTP/1.1")
        .to_string()
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a [u8]>) -> Vec<HeaderField> {
    let mut ordered: Vec<HeaderField> = Vec::new();
    for raw in lines {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\r');
        if text.is_empty() {
            continue;
        }
        let Some((name, value)) = text.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if let Some(existing) = ordered.iter_mut().find(|h| h.name.eq_ignore_ascii_case(name)) {
            existing.value.push('\n');
            existing.value.push_str(value);
        } else {
            ordered.push(HeaderField {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }
    ordered
}

/// Splits a payload into `(header_block, body)` on the first blank line,
/// accepting either `\r\n\r\n` or bare `\n\n` separators.
fn split_header_block(payload: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find_subsequence(payload, b"\r\n\r\n") {
        return Some((&payload[..pos], &payload[pos + 4..]));
    }
    find_subsequence(payload, b"\n\n").map(|pos| (&payload[..pos], &payload[pos + 2..]))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_gzip_best_effort(body: &[u8]) -> Vec<u8> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        // Truncated gzip stream (common for partial captures) or bytes that
        // merely claimed to be gzip: fall back to the raw body untouched.
        Err(_) => body.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_line() {
        let payload = b"GET /v1/users HTTP/1.1\r\nHost: x\r\n\r\n";
        match classify(payload) {
            PayloadType::Request { method, path } => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/v1/users");
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn classifies_status_line() {
        let payload = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
        match classify(payload) {
            PayloadType::Response { status, reason } => {
                assert_eq!(status, 200);
                assert_eq!(reason, "OK");
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_http_like_marker() {
        let payload = b"garbage before HTTP garbage after";
        match classify(payload) {
            PayloadType::HttpLike { offset } => assert_eq!(offset, 15),
            other => panic!("expected HttpLike, got {other:?}"),
        }
    }

    #[test]
    fn not_http_when_no_marker() {
        assert_eq!(classify(b"\x01\x02\x03\x04"), PayloadType::NotHttp);
    }

    #[test]
    fn multi_value_headers_join_with_newline() {
        let payload = b"GET / HTTP/1.1\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n";
        let kind = classify(payload);
        let parsed = parse_message(payload, &kind).unwrap();
        let cookie = parsed
            .headers
            .iter()
            .find(|h| h.name == "Set-Cookie")
            .unwrap();
        assert_eq!(cookie.value, "a=1\nb=2");
    }

    #[test]
    fn truncated_body_is_not_an_error() {
        let payload = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\nshort";
        let kind = classify(payload);
        let parsed = parse_message(payload, &kind).unwrap();
        assert_eq!(parsed.body, b"short");
    }

    #[test]
    fn invalid_gzip_body_falls_back_to_raw() {
        let payload = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\nnotgzip";
        let kind = classify(payload);
        let parsed = parse_message(payload, &kind).unwrap();
        assert_eq!(parsed.body, b"notgzip");
    }
}
