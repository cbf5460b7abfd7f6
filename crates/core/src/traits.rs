//! External collaborators the coordinator consumes (spec §6).
//!
//! These traits are contracts only — this workspace implements none of
//! them beyond the in-memory fakes in [`crate::testing`]. The wire protocol
//! to a real metastore, a real filesystem driver, and the query
//! planner/executor that produces intents are all out of scope (spec §1).

use std::io;

use crate::action::PartitionRowDelta;
use crate::model::{Partition, Table, TableKey};
use crate::statistics::Statistics;
use crate::types::{Identity, PartitionValues, QueryId, TransactionId, WriteId};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemEntry {
    /// Full path.
    pub path: String,
    /// Whether the entry is itself a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

/// The kind of ACID write lock being acquired, for lock-manager bookkeeping
/// on the catalog side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteLockKind {
    /// `INSERT`.
    Insert,
    /// Row-level `DELETE`.
    Delete,
    /// Row-level `UPDATE`.
    Update,
}

/// Grantee + privilege pair as returned by `list_grants`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Principal the privilege is granted to.
    pub principal: String,
    /// Privilege name (e.g. `"SELECT"`, `"INSERT"`).
    pub privilege: String,
    /// Whether the principal may re-grant this privilege.
    pub grantable: bool,
}

/// The filesystem abstraction the Filesystem Orchestrator (C3) drives.
///
/// All methods are synchronous; bounded concurrency over them is the
/// coordinator's responsibility (spec §5), not this trait's.
pub trait FilesystemDriver: Send + Sync {
    /// Whether `path` exists (file or directory).
    fn exists(&self, path: &str) -> io::Result<bool>;

    /// Whether `path` exists and is a directory.
    fn is_dir(&self, path: &str) -> io::Result<bool>;

    /// Create `path` and any missing parents.
    fn mkdirs(&self, path: &str) -> io::Result<()>;

    /// Rename `src` to `dst`. Returns `Ok(true)` on success, `Ok(false)` if
    /// the driver declines without an error (rare); callers treat a
    /// pre-existing `dst` as [`crate::CoordinatorError::PathAlreadyExists`],
    /// not as this return value.
    fn rename(&self, src: &str, dst: &str) -> io::Result<bool>;

    /// Delete `path`. `recursive` controls whether a non-empty directory is
    /// removed along with its contents.
    fn delete(&self, path: &str, recursive: bool) -> io::Result<bool>;

    /// Non-recursive directory listing.
    fn list(&self, path: &str) -> io::Result<Vec<FilesystemEntry>>;

    /// Recursive file listing (directories are not yielded, only files).
    fn list_files_recursive(&self, path: &str) -> io::Result<Vec<FilesystemEntry>>;

    /// Open `path` for reading.
    fn open_input(&self, path: &str) -> io::Result<Box<dyn io::Read + Send>>;

    /// Open `path` for writing, creating or truncating it.
    fn new_output(&self, path: &str) -> io::Result<Box<dyn io::Write + Send>>;
}

/// The external catalog client (spec §6 `Metastore`).
///
/// Every call may fail with [`crate::CoordinatorError::CatalogError`]
/// (retryable) or one of the domain-specific variants named per method.
pub trait Metastore: Send + Sync {
    /// Fetch a schema's metadata, if it exists.
    fn get_database(&self, schema: &str) -> crate::Result<Option<StorageLocationOnly>>;
    /// Create a schema.
    fn create_database(&self, schema: &str, location: Option<&str>) -> crate::Result<()>;
    /// Drop a schema. `delete_data` mirrors the "empty-or-fallback" rule.
    fn drop_database(&self, schema: &str, delete_data: bool) -> crate::Result<()>;
    /// Rename a schema.
    fn rename_database(&self, schema: &str, new_name: &str) -> crate::Result<()>;

    /// List table names in a schema.
    fn list_tables(&self, schema: &str) -> crate::Result<Vec<String>>;
    /// Fetch a table's catalog definition.
    fn get_table(&self, key: &TableKey) -> crate::Result<Option<Table>>;
    /// Create a table. Fails with [`crate::CoordinatorError::TableAlreadyExists`]
    /// if the name is taken; the apply phase (§4.5 step 1) re-fetches and
    /// decides whether that is an idempotent retry.
    fn create_table(&self, table: &Table) -> crate::Result<()>;
    /// Replace a table's definition in place (used by `ALTER`).
    fn replace_table(&self, table: &Table) -> crate::Result<()>;
    /// Replace a table's definition using the transactional alter entry
    /// point (used when an ACID transaction is open on the table).
    fn alter_transactional_table(
        &self,
        table: &Table,
        txn_id: TransactionId,
        write_id: WriteId,
    ) -> crate::Result<()>;
    /// Drop a table.
    fn drop_table(&self, key: &TableKey, delete_data: bool) -> crate::Result<()>;

    /// Fetch one partition by its values.
    fn get_partition(&self, table: &TableKey, values: &PartitionValues) -> crate::Result<Option<Partition>>;
    /// List partition names matching an opaque catalog filter expression.
    fn get_partition_names_by_filter(&self, table: &TableKey, filter: &str) -> crate::Result<Vec<String>>;
    /// Fetch several partitions by their rendered names.
    fn get_partitions_by_names(&self, table: &TableKey, names: &[String]) -> crate::Result<Vec<Partition>>;
    /// Add a batch of partitions.
    fn add_partitions(&self, table: &TableKey, partitions: &[Partition]) -> crate::Result<()>;
    /// Replace a partition's definition in place.
    fn alter_partition(&self, partition: &Partition) -> crate::Result<()>;
    /// Drop a partition.
    fn drop_partition(&self, table: &TableKey, values: &PartitionValues, delete_data: bool) -> crate::Result<()>;

    /// Fetch a table's statistics.
    fn get_table_statistics(&self, table: &TableKey) -> crate::Result<Statistics>;
    /// Replace or merge a table's statistics.
    fn update_table_statistics(&self, table: &TableKey, stats: &Statistics, merge: bool) -> crate::Result<()>;
    /// Fetch a partition's statistics.
    fn get_partition_statistics(&self, table: &TableKey, values: &PartitionValues) -> crate::Result<Statistics>;
    /// Replace or merge a partition's statistics.
    fn update_partition_statistics(
        &self,
        table: &TableKey,
        values: &PartitionValues,
        stats: &Statistics,
        merge: bool,
    ) -> crate::Result<()>;

    /// Open a new ACID transaction, returning its id.
    fn open_transaction(&self) -> crate::Result<TransactionId>;
    /// Commit an ACID transaction.
    fn commit_transaction(&self, txn_id: TransactionId) -> crate::Result<()>;
    /// Abort an ACID transaction.
    fn abort_transaction(&self, txn_id: TransactionId) -> crate::Result<()>;
    /// Acquire a table write lock for the given operation kind, blocking
    /// until granted.
    fn acquire_table_write_lock(
        &self,
        txn_id: TransactionId,
        table: &TableKey,
        kind: WriteLockKind,
    ) -> crate::Result<()>;
    /// Allocate a write-id for a transactional table within `txn_id`.
    fn allocate_write_id(&self, txn_id: TransactionId, table: &TableKey) -> crate::Result<WriteId>;
    /// Heartbeat an open transaction so the catalog does not time it out.
    fn send_transaction_heartbeat(&self, txn_id: TransactionId) -> crate::Result<()>;
    /// Fetch the set of write-ids valid for snapshot reads of `table`.
    fn get_valid_write_ids(&self, table: &TableKey) -> crate::Result<Vec<WriteId>>;

    /// List grants visible to the current principal on `object`.
    fn list_grants(&self, object: &str) -> crate::Result<Vec<Grant>>;
    /// Grant privileges.
    fn grant_privileges(&self, object: &str, principal: &str, privileges: &[String]) -> crate::Result<()>;
    /// Revoke privileges.
    fn revoke_privileges(&self, object: &str, principal: &str, privileges: &[String]) -> crate::Result<()>;
    /// Create a role.
    fn create_role(&self, role: &str) -> crate::Result<()>;
    /// Drop a role.
    fn drop_role(&self, role: &str) -> crate::Result<()>;
    /// List known roles.
    fn list_roles(&self) -> crate::Result<Vec<String>>;
    /// Grant a role to a principal.
    fn grant_role(&self, role: &str, principal: &str) -> crate::Result<()>;
    /// Revoke a role from a principal.
    fn revoke_role(&self, role: &str, principal: &str) -> crate::Result<()>;
}

/// Minimal schema metadata (location only — the rest of a schema's fields
/// are not needed by this coordinator).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageLocationOnly {
    /// The schema's directory, if it has one.
    pub location: Option<String>,
}

/// Supplies the caller identity and query id used to tag actions and file
/// names (spec §6 "Identity/context provider").
pub trait IdentityProvider: Send + Sync {
    /// The user principal driving the current session.
    fn current_identity(&self) -> Identity;
    /// The query id of the statement currently in flight.
    fn current_query_id(&self) -> QueryId;
}

/// Re-exported for callers building row-mutation payloads against this trait
/// module without importing `action` directly.
pub type RowDelta = PartitionRowDelta;
