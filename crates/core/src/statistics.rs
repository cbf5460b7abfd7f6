//! Table and partition statistics, and their merge semantics (§4.4).

use std::collections::HashMap;

/// Basic counters for a table or partition. Each field is optional because
/// the catalog or a writer may not have computed every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct BasicStatistics {
    /// Number of rows.
    pub row_count: Option<u64>,
    /// Number of data files.
    pub file_count: Option<u64>,
    /// Estimated in-memory footprint, bytes.
    pub in_memory_bytes: Option<u64>,
    /// On-disk footprint, bytes.
    pub on_disk_bytes: Option<u64>,
}

impl BasicStatistics {
    /// Merge `new` over `old`: a present field in `new` always wins; an
    /// absent one falls back to `old`. Never adds or averages.
    pub fn merge(old: BasicStatistics, new: BasicStatistics) -> BasicStatistics {
        BasicStatistics {
            row_count: new.row_count.or(old.row_count),
            file_count: new.file_count.or(old.file_count),
            in_memory_bytes: new.in_memory_bytes.or(old.in_memory_bytes),
            on_disk_bytes: new.on_disk_bytes.or(old.on_disk_bytes),
        }
    }

    /// Apply a signed row-count delta (negative for deletes), saturating at
    /// zero. All other fields pass through unchanged.
    pub fn with_adjusted_row_count(self, delta: i64) -> BasicStatistics {
        let row_count = self.row_count.map(|rc| {
            if delta >= 0 {
                rc.saturating_add(delta as u64)
            } else {
                rc.saturating_sub(delta.unsigned_abs())
            }
        });
        BasicStatistics { row_count, ..self }
    }
}

/// Per-column statistics. Fields are opaque scalars (rendered as strings by
/// the catalog client) since the coordinator does not interpret column
/// types; only presence/absence and merge order matter here.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ColumnStatistics {
    /// Minimum value, catalog-rendered.
    pub min_value: Option<String>,
    /// Maximum value, catalog-rendered.
    pub max_value: Option<String>,
    /// Count of NULLs.
    pub null_count: Option<u64>,
    /// Distinct-value estimate.
    pub distinct_count: Option<u64>,
}

/// Combined basic and per-column statistics for a table or partition.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Statistics {
    /// Row/file/byte counters.
    pub basic: BasicStatistics,
    /// Per-column statistics, keyed by column name.
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    /// Merge `new` over `old` per §4.4: basic stats merge field-by-field;
    /// column stats are overridden key-by-key, other keys preserved.
    pub fn merge(old: Statistics, new: Statistics) -> Statistics {
        let basic = BasicStatistics::merge(old.basic, new.basic);
        let mut column_stats = old.column_stats;
        for (k, v) in new.column_stats {
            column_stats.insert(k, v);
        }
        Statistics { basic, column_stats }
    }

    /// Apply a row-count delta to the basic stats only.
    pub fn with_adjusted_row_count(mut self, delta: i64) -> Statistics {
        self.basic = self.basic.with_adjusted_row_count(delta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_merge_prefers_new_when_present() {
        let old = BasicStatistics {
            row_count: Some(10),
            file_count: Some(2),
            ..Default::default()
        };
        let new = BasicStatistics {
            row_count: Some(15),
            ..Default::default()
        };
        let merged = BasicStatistics::merge(old, new);
        assert_eq!(merged.row_count, Some(15));
        assert_eq!(merged.file_count, Some(2));
    }

    #[test]
    fn row_count_adjustment_saturates_at_zero() {
        let s = BasicStatistics {
            row_count: Some(3),
            ..Default::default()
        };
        assert_eq!(s.with_adjusted_row_count(-10).row_count, Some(0));
        assert_eq!(s.with_adjusted_row_count(5).row_count, Some(8));
    }

    #[test]
    fn column_stats_merge_preserves_untouched_keys() {
        let mut old = Statistics::default();
        old.column_stats.insert(
            "a".into(),
            ColumnStatistics {
                null_count: Some(1),
                ..Default::default()
            },
        );
        old.column_stats.insert(
            "b".into(),
            ColumnStatistics {
                null_count: Some(2),
                ..Default::default()
            },
        );

        let mut new = Statistics::default();
        new.column_stats.insert(
            "a".into(),
            ColumnStatistics {
                null_count: Some(9),
                ..Default::default()
            },
        );

        let merged = Statistics::merge(old, new);
        assert_eq!(merged.column_stats["a"].null_count, Some(9));
        assert_eq!(merged.column_stats["b"].null_count, Some(2));
    }
}
