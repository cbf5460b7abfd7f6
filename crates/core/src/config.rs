//! The enumerated configuration surface.

use std::time::Duration;

/// Configuration options the engine's SQL layer injects into the coordinator.
///
/// A plain struct with a literal `Default`, not a builder macro.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Skip deleting the old directory during an in-place `ALTER TABLE`.
    pub skip_deletion_for_alter: bool,
    /// Skip scrubbing `DIRECT_TO_NEW` target directories on rollback.
    pub skip_target_cleanup_on_rollback: bool,
    /// Allow writes to tables whose location the catalog does not manage.
    pub writes_to_non_managed_tables_enabled: bool,
    /// Allow `CREATE TABLE` with an explicit, catalog-unmanaged location.
    pub creates_of_non_managed_tables_enabled: bool,
    /// On schema drop, delete the schema's location even when non-empty.
    pub delete_schema_locations_fallback: bool,
    /// Bound on concurrent per-file renames during `INSERT_EXISTING`.
    pub max_concurrent_filesystem_operations: usize,
    /// Bound on concurrent irreversible metastore drop calls.
    pub max_concurrent_metastore_drops: usize,
    /// Bound on concurrent metastore statistics-update calls. `1` means inline.
    pub max_concurrent_metastore_updates: usize,
    /// Reject a single partition-drop batch larger than this, fast.
    pub max_partition_drops_per_query: usize,
    /// Bound on the per-transaction merged-partition read cache.
    pub per_transaction_cache_max_size: usize,
    /// Heartbeat interval for ACID transactions; `None` disables heartbeats
    /// (the catalog's own timeout, if any, is then authoritative).
    pub hive_transaction_heartbeat_interval: Option<Duration>,
    /// Batch size for `add_partition` calls during apply.
    pub partition_commit_batch_size: usize,
    /// Delete a now-empty directory during scoped cleanup even when its
    /// name doesn't match the delta-directory pattern.
    pub delete_empty_directories: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            skip_deletion_for_alter: false,
            skip_target_cleanup_on_rollback: false,
            writes_to_non_managed_tables_enabled: false,
            creates_of_non_managed_tables_enabled: false,
            delete_schema_locations_fallback: false,
            max_concurrent_filesystem_operations: 20,
            max_concurrent_metastore_drops: 20,
            max_concurrent_metastore_updates: 20,
            max_partition_drops_per_query: 3000,
            per_transaction_cache_max_size: 1000,
            hive_transaction_heartbeat_interval: Some(Duration::from_secs(150)),
            partition_commit_batch_size: 8,
            delete_empty_directories: false,
        }
    }
}
