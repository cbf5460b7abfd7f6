//! The Statistics Merger (C4): §4.4.

use stc_core::action::{ActionKind, PartitionRowDelta};
use stc_core::{Metastore, PartitionValues, Statistics, TableKey};

/// Fetch a table's statistics, downgrading a catalog error to an empty
/// statistics value rather than failing the read.
///
/// A corrupted or momentarily unreachable statistics source should not take
/// down an otherwise-successful read of the table itself (supplemental
/// behavior beyond the core merge rule: statistics are best-effort).
pub fn fetch_table_statistics_or_empty(metastore: &dyn Metastore, table: &TableKey) -> Statistics {
    match metastore.get_table_statistics(table) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(
                target: "stc::engine",
                table = %table,
                error = %e,
                "table statistics unavailable; treating as empty",
            );
            Statistics::default()
        }
    }
}

/// Same downgrade for partition statistics.
pub fn fetch_partition_statistics_or_empty(
    metastore: &dyn Metastore,
    table: &TableKey,
    values: &PartitionValues,
) -> Statistics {
    match metastore.get_partition_statistics(table, values) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(
                target: "stc::engine",
                table = %table,
                values = ?values,
                error = %e,
                "partition statistics unavailable; treating as empty",
            );
            Statistics::default()
        }
    }
}

/// Merge an `INSERT_EXISTING` action's contributed statistics over the
/// existing value, per its own `merge` flag (§4.1/§4.4: replace when
/// `merge` is false, e.g. `INSERT OVERWRITE`).
pub fn merge_insert_existing(existing: Statistics, update: &Statistics, merge: bool) -> Statistics {
    if merge {
        Statistics::merge(existing, update.clone())
    } else {
        update.clone()
    }
}

/// Fold a `DELETE_ROWS`/`UPDATE` action's per-partition row deltas into a
/// row-count adjustment, signed by the action kind (§4.1: deltas are always
/// recorded positive; the action kind implies the sign).
pub fn row_delta_adjustment(kind: ActionKind, deltas: &[PartitionRowDelta]) -> i64 {
    let magnitude: i64 = deltas.iter().map(|d| d.rows as i64).sum();
    match kind {
        ActionKind::DeleteRows | ActionKind::Update => -magnitude,
        _ => magnitude,
    }
}

/// Apply a signed row adjustment to an existing statistics value.
pub fn apply_row_adjustment(existing: Statistics, delta: i64) -> Statistics {
    existing.with_adjusted_row_count(delta)
}
