//! Declared-operation vs. captured-exchange matching and row materialization
//! (C9, pure half). Catalog paging, persistence, and report lifecycle live
//! in the server; this module takes the already-fetched operation list and
//! already-stored exchanges and produces the final row set.

use std::collections::HashMap;

use crate::model::{ReportDataRow, RowComment, row_sort_key};
use crate::path_template::PathMatcher;

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum OperationStatus {
    Found,
    NotFound,
}

/// A declared operation fetched from the catalog for one package version.
#[derive(Debug, Clone)]
pub struct DeclaredOperation {
    pub operation_id: String,
    pub path: String,
    pub method: String,
}

/// A captured HTTP exchange as seen by the packet store, already carrying
/// resolved peer labels.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    pub packet_id: i64,
    pub method: String,
    pub path: String,
    pub src_peer_label: String,
    pub dst_peer_label: String,
}

/// Per-operation outcome, persisted by the caller before row materialization.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub operation_id: String,
    pub status: OperationStatus,
    pub hit_count: u64,
}

/// Assigns each captured exchange to at most one declared operation.
///
/// Iterates operations in catalog order; the first operation that matches a
/// given packet claims it, so ties between overlapping templates resolve in
/// favor of the earlier-declared operation.
pub fn assign_operations(
    operations: &[DeclaredOperation],
    exchanges: &[CapturedExchange],
) -> HashMap<i64, usize> {
    let matchers: Vec<(PathMatcher, &str)> = operations
        .iter()
        .map(|op| (PathMatcher::compile(&op.path), op.method.as_str()))
        .collect();

    let mut assignment = HashMap::new();
    for exchange in exchanges {
        for (idx, (matcher, method)) in matchers.iter().enumerate() {
            if *method == exchange.method && matcher.is_match(&exchange.path) {
                assignment.insert(exchange.packet_id, idx);
                break;
            }
        }
    }
    assignment
}

/// Computes per-operation hit counts and `Found`/`NotFound` status.
pub fn operation_outcomes(
    operations: &[DeclaredOperation],
    exchanges: &[CapturedExchange],
) -> Vec<OperationOutcome> {
    let assignment = assign_operations(operations, exchanges);
    let mut counts = vec![0u64; operations.len()];
    for &idx in assignment.values() {
        counts[idx] += 1;
    }
    operations
        .iter()
        .zip(counts)
        .map(|(op, count)| OperationOutcome {
            operation_id: op.operation_id.clone(),
            status: if count > 0 { OperationStatus::Found } else { OperationStatus::NotFound },
            hit_count: count,
        })
        .collect()
}

/// The packet-to-operation affinity bridge: every `(operation_id, packet_id)`
/// pair where the packet matched that operation. A packet appears at most
/// once, per [`assign_operations`]'s tie-break rule.
pub fn affected_pairs(operations: &[DeclaredOperation], exchanges: &[CapturedExchange]) -> Vec<(String, i64)> {
    assign_operations(operations, exchanges)
        .into_iter()
        .map(|(packet_id, idx)| (operations[idx].operation_id.clone(), packet_id))
        .collect()
}

/// Materializes the final report rows: one row per matched operation
/// (`Found` with its hit count, or `NotFound` with zero), plus one
/// aggregated `Extra` row per `(src, dst, path, method)` group of packets
/// that matched no declared operation. Rows come back pre-sorted by
/// `(path, method, src_peer, dst_peer, operation_id)`.
pub fn materialize_rows(
    operations: &[DeclaredOperation],
    exchanges: &[CapturedExchange],
) -> Vec<ReportDataRow> {
    let assignment = assign_operations(operations, exchanges);
    let outcomes = operation_outcomes(operations, exchanges);

    let mut rows = Vec::new();

    for (op, outcome) in operations.iter().zip(&outcomes) {
        // A `Found` operation's row reports the aggregate hit count, not a
        // specific packet's peers — pick any matching exchange's peers as
        // representative, matching the upstream renderer's behavior.
        let representative = exchanges.iter().find(|ex| {
            assignment
                .get(&ex.packet_id)
                .is_some_and(|&idx| operations[idx].operation_id == op.operation_id)
        });
        let (sender, receiver) = representative
            .map(|ex| (ex.src_peer_label.clone(), ex.dst_peer_label.clone()))
            .unwrap_or_default();
        rows.push(ReportDataRow {
            sender,
            receiver,
            method: op.method.clone(),
            path: op.path.clone(),
            operation_id: op.operation_id.clone(),
            count: outcome.hit_count,
            comment: match outcome.status {
                OperationStatus::Found => RowComment::Found,
                OperationStatus::NotFound => RowComment::NotFound,
            },
        });
    }

    let mut extra_groups: HashMap<(String, String, String, String), u64> = HashMap::new();
    for exchange in exchanges {
        if assignment.contains_key(&exchange.packet_id) {
            continue;
        }
        let key = (
            exchange.src_peer_label.clone(),
            exchange.dst_peer_label.clone(),
            exchange.path.clone(),
            exchange.method.clone(),
        );
        *extra_groups.entry(key).or_insert(0) += 1;
    }
    for ((sender, receiver, path, method), count) in extra_groups {
        rows.push(ReportDataRow {
            sender,
            receiver,
            method,
            path,
            operation_id: String::new(),
            count,
            comment: RowComment::Extra,
        });
    }

    rows.sort_by_key(row_sort_key);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: &str, path: &str, method: &str) -> DeclaredOperation {
        DeclaredOperation { operation_id: id.into(), path: path.into(), method: method.into() }
    }

    fn exchange(id: i64, method: &str, path: &str, src: &str, dst: &str) -> CapturedExchange {
        CapturedExchange {
            packet_id: id,
            method: method.into(),
            path: path.into(),
            src_peer_label: src.into(),
            dst_peer_label: dst.into(),
        }
    }

    #[test]
    fn exact_match_yields_found_row_with_no_extra() {
        let ops = vec![op("listUsers", "/v1/users", "GET")];
        let exchanges = vec![
            exchange(1, "GET", "/v1/users", "client", "users-svc"),
            exchange(2, "GET", "/v1/users/response-line", "users-svc", "client"),
        ];
        let rows = materialize_rows(&ops, &exchanges);
        let found = rows.iter().find(|r| r.operation_id == "listUsers").unwrap();
        assert_eq!(found.comment, RowComment::Found);
        assert_eq!(found.count, 1);
        let extras: Vec<_> = rows.iter().filter(|r| r.comment == RowComment::Extra).collect();
        assert_eq!(extras.len(), 1);
    }

    #[test]
    fn template_match_counts_single_hit() {
        let ops = vec![op("getUser", "/v1/users/*", "GET")];
        let exchanges = vec![exchange(1, "GET", "/v1/users/42", "client", "users-svc")];
        let rows = materialize_rows(&ops, &exchanges);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comment, RowComment::Found);
        assert_eq!(rows[0].count, 1);
    }

    #[test]
    fn unmatched_request_produces_extra_and_every_operation_not_found() {
        let ops = vec![op("listUsers", "/v1/users", "GET")];
        let exchanges = vec![exchange(1, "DELETE", "/admin/shutdown", "client", "admin-svc")];
        let rows = materialize_rows(&ops, &exchanges);
        let extra = rows.iter().find(|r| r.comment == RowComment::Extra).unwrap();
        assert_eq!(extra.count, 1);
        let not_found = rows.iter().find(|r| r.operation_id == "listUsers").unwrap();
        assert_eq!(not_found.comment, RowComment::NotFound);
        assert_eq!(not_found.count, 0);
    }

    #[test]
    fn overlapping_operations_resolve_by_catalog_order() {
        let ops = vec![op("a", "/v1/*", "GET"), op("b", "/v1/users", "GET")];
        let exchanges = vec![exchange(1, "GET", "/v1/users", "client", "svc")];
        let outcomes = operation_outcomes(&ops, &exchanges);
        assert_eq!(outcomes[0].hit_count, 1);
        assert_eq!(outcomes[1].hit_count, 0);
    }

    #[test]
    fn rows_are_sorted_by_path_then_method_then_peers_then_operation() {
        let ops = vec![op("b", "/b", "GET"), op("a", "/a", "GET")];
        let exchanges = vec![];
        let rows = materialize_rows(&ops, &exchanges);
        assert_eq!(rows[0].path, "/a");
        assert_eq!(rows[1].path, "/b");
    }
}
