use std::collections::HashSet;

use traffic_analyzer_core::fingerprint::PacketFingerprint;
use traffic_analyzer_core::http::{PayloadType, classify, parse_message};
use traffic_analyzer_core::reconcile::{CapturedExchange, DeclaredOperation, materialize_rows};
use traffic_analyzer_core::model::RowComment;

/// Scenario 1 from the design: ingesting the same two exchanges twice
/// against an empty in-memory set must not grow the set past 2 entries.
#[test]
fn ingest_is_idempotent_under_fingerprint_dedup() {
    let mut seen: HashSet<PacketFingerprint> = HashSet::new();

    let fp = |ts: i64| PacketFingerprint {
        capture_id: "cap1".into(),
        source_peer_id: 1,
        source_port: 5000,
        dest_peer_id: 2,
        dest_port: 8080,
        seq_no: 100,
        ack_no: 200,
        timestamp: ts,
    };

    for _ in 0..2 {
        seen.insert(fp(1_700_000_000));
        seen.insert(fp(1_700_000_001));
    }

    assert_eq!(seen.len(), 2);
}

/// Scenario 2: an exact-path declared operation produces a single Found row
/// and the response line produces its own Extra row.
#[test]
fn request_and_response_payloads_classify_and_reconcile() {
    let request = b"GET /v1/users HTTP/1.1\r\nHost: users-svc\r\n\r\n";
    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}";

    let req_kind = classify(request);
    let resp_kind = classify(response);
    let req = parse_message(request, &req_kind).unwrap();
    let resp = parse_message(response, &resp_kind).unwrap();

    let (method, path) = match req.line {
        traffic_analyzer_core::http::MessageLine::Request { method, path, .. } => (method, path),
        _ => panic!("expected request line"),
    };
    let (resp_method, resp_path) = match resp.line {
        traffic_analyzer_core::http::MessageLine::Response { status, reason, .. } => {
            (status.to_string(), reason)
        }
        _ => panic!("expected response line"),
    };

    let operations = vec![DeclaredOperation {
        operation_id: "listUsers".into(),
        path: "/v1/users".into(),
        method: "GET".into(),
    }];
    let exchanges = vec![
        CapturedExchange {
            packet_id: 1,
            method,
            path,
            src_peer_label: "client".into(),
            dst_peer_label: "users-svc".into(),
        },
        CapturedExchange {
            packet_id: 2,
            method: resp_method,
            path: resp_path,
            src_peer_label: "users-svc".into(),
            dst_peer_label: "client".into(),
        },
    ];

    let rows = materialize_rows(&operations, &exchanges);
    let found = rows.iter().find(|r| r.operation_id == "listUsers").unwrap();
    assert_eq!(found.comment, RowComment::Found);
    assert_eq!(found.count, 1);
    assert_eq!(rows.iter().filter(|r| r.comment == RowComment::Extra).count(), 1);
}

#[test]
fn http_like_payload_is_not_parsed_as_a_message() {
    let payload = b"garbage HTTP garbage";
    assert!(matches!(classify(payload), PayloadType::HttpLike { .. }));
}
