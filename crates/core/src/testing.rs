//! In-memory fakes for the external collaborators, for use in this
//! workspace's own tests. Always compiled (not `#[cfg(test)]`-gated) so
//! dependent crates can use them without a dev-dependency cycle.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::model::{Partition, Table, TableKey};
use crate::statistics::Statistics;
use crate::traits::{FilesystemDriver, FilesystemEntry, Grant, IdentityProvider, Metastore, StorageLocationOnly, WriteLockKind};
use crate::types::{Identity, PartitionValues, QueryId, TransactionId, WriteId};
use crate::CoordinatorError;

#[derive(Default)]
struct MetastoreState {
    schemas: HashMap<String, StorageLocationOnly>,
    tables: HashMap<TableKey, Table>,
    partitions: HashMap<(TableKey, PartitionValues), Partition>,
    table_stats: HashMap<TableKey, Statistics>,
    partition_stats: HashMap<(TableKey, PartitionValues), Statistics>,
    grants: HashMap<String, Vec<Grant>>,
    roles: Vec<String>,
    open_transactions: Vec<TransactionId>,
}

/// An in-memory catalog used as the `Metastore` fake in tests.
pub struct InMemoryMetastore {
    state: Mutex<MetastoreState>,
    next_txn_id: AtomicU64,
    next_write_id: AtomicU64,
}

impl Default for InMemoryMetastore {
    fn default() -> Self {
        InMemoryMetastore {
            state: Mutex::new(MetastoreState::default()),
            next_txn_id: AtomicU64::new(1),
            next_write_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryMetastore {
    /// Seed a table directly, bypassing the action log (test setup helper).
    pub fn seed_table(&self, table: Table) {
        self.state.lock().tables.insert(table.key.clone(), table);
    }

    /// Seed a partition directly (test setup helper).
    pub fn seed_partition(&self, partition: Partition) {
        let key = (partition.table.clone(), partition.values.clone());
        self.state.lock().partitions.insert(key, partition);
    }

    /// Seed table statistics directly (test setup helper).
    pub fn seed_table_statistics(&self, table: TableKey, stats: Statistics) {
        self.state.lock().table_stats.insert(table, stats);
    }

    /// Seed partition statistics directly (test setup helper).
    pub fn seed_partition_statistics(&self, table: TableKey, values: PartitionValues, stats: Statistics) {
        self.state.lock().partition_stats.insert((table, values), stats);
    }
}

impl Metastore for InMemoryMetastore {
    fn get_database(&self, schema: &str) -> crate::Result<Option<StorageLocationOnly>> {
        Ok(self.state.lock().schemas.get(schema).cloned())
    }

    fn create_database(&self, schema: &str, location: Option<&str>) -> crate::Result<()> {
        self.state.lock().schemas.insert(
            schema.to_string(),
            StorageLocationOnly {
                location: location.map(str::to_string),
            },
        );
        Ok(())
    }

    fn drop_database(&self, schema: &str, _delete_data: bool) -> crate::Result<()> {
        self.state.lock().schemas.remove(schema);
        Ok(())
    }

    fn rename_database(&self, schema: &str, new_name: &str) -> crate::Result<()> {
        let mut state = self.state.lock();
        if let Some(v) = state.schemas.remove(schema) {
            state.schemas.insert(new_name.to_string(), v);
        }
        Ok(())
    }

    fn list_tables(&self, schema: &str) -> crate::Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .tables
            .keys()
            .filter(|k| k.schema_name.0 == schema)
            .map(|k| k.table_name.0.clone())
            .collect())
    }

    fn get_table(&self, key: &TableKey) -> crate::Result<Option<Table>> {
        Ok(self.state.lock().tables.get(key).cloned())
    }

    fn create_table(&self, table: &Table) -> crate::Result<()> {
        let mut state = self.state.lock();
        if state.tables.contains_key(&table.key) {
            return Err(CoordinatorError::TableAlreadyExists(table.key.clone()));
        }
        state.tables.insert(table.key.clone(), table.clone());
        Ok(())
    }

    fn replace_table(&self, table: &Table) -> crate::Result<()> {
        let mut state = self.state.lock();
        if !state.tables.contains_key(&table.key) {
            return Err(CoordinatorError::TableNotFound(table.key.clone()));
        }
        state.tables.insert(table.key.clone(), table.clone());
        Ok(())
    }

    fn alter_transactional_table(
        &self,
        table: &Table,
        _txn_id: TransactionId,
        _write_id: WriteId,
    ) -> crate::Result<()> {
        self.replace_table(table)
    }

    fn drop_table(&self, key: &TableKey, _delete_data: bool) -> crate::Result<()> {
        let mut state = self.state.lock();
        if state.tables.remove(key).is_none() {
            return Err(CoordinatorError::TableNotFound(key.clone()));
        }
        Ok(())
    }

    fn get_partition(&self, table: &TableKey, values: &PartitionValues) -> crate::Result<Option<Partition>> {
        Ok(self
            .state
            .lock()
            .partitions
            .get(&(table.clone(), values.clone()))
            .cloned())
    }

    fn get_partition_names_by_filter(&self, table: &TableKey, _filter: &str) -> crate::Result<Vec<String>> {
        let state = self.state.lock();
        let t = state.tables.get(table);
        let cols: Vec<String> = t.map(|t| t.partition_columns.clone()).unwrap_or_default();
        Ok(state
            .partitions
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, v)| v.to_partition_name(&cols))
            .collect())
    }

    fn get_partitions_by_names(&self, table: &TableKey, names: &[String]) -> crate::Result<Vec<Partition>> {
        let state = self.state.lock();
        let cols: Vec<String> = state
            .tables
            .get(table)
            .map(|t| t.partition_columns.clone())
            .unwrap_or_default();
        Ok(state
            .partitions
            .iter()
            .filter(|((t, v), _)| t == table && names.contains(&v.to_partition_name(&cols)))
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn add_partitions(&self, table: &TableKey, partitions: &[Partition]) -> crate::Result<()> {
        let mut state = self.state.lock();
        for p in partitions {
            let key = (table.clone(), p.values.clone());
            if state.partitions.contains_key(&key) {
                return Err(CoordinatorError::PartitionAlreadyExists {
                    table: table.clone(),
                    values: p.values.clone(),
                });
            }
        }
        for p in partitions {
            let key = (table.clone(), p.values.clone());
            state.partitions.insert(key, p.clone());
        }
        Ok(())
    }

    fn alter_partition(&self, partition: &Partition) -> crate::Result<()> {
        let key = (partition.table.clone(), partition.values.clone());
        let mut state = self.state.lock();
        if !state.partitions.contains_key(&key) {
            return Err(CoordinatorError::PartitionNotFound {
                table: partition.table.clone(),
                values: partition.values.clone(),
            });
        }
        state.partitions.insert(key, partition.clone());
        Ok(())
    }

    fn drop_partition(&self, table: &TableKey, values: &PartitionValues, _delete_data: bool) -> crate::Result<()> {
        let key = (table.clone(), values.clone());
        if self.state.lock().partitions.remove(&key).is_none() {
            return Err(CoordinatorError::PartitionNotFound {
                table: table.clone(),
                values: values.clone(),
            });
        }
        Ok(())
    }

    fn get_table_statistics(&self, table: &TableKey) -> crate::Result<Statistics> {
        Ok(self.state.lock().table_stats.get(table).cloned().unwrap_or_default())
    }

    fn update_table_statistics(&self, table: &TableKey, stats: &Statistics, merge: bool) -> crate::Result<()> {
        let mut state = self.state.lock();
        let updated = if merge {
            let old = state.table_stats.get(table).cloned().unwrap_or_default();
            Statistics::merge(old, stats.clone())
        } else {
            stats.clone()
        };
        state.table_stats.insert(table.clone(), updated);
        Ok(())
    }

    fn get_partition_statistics(&self, table: &TableKey, values: &PartitionValues) -> crate::Result<Statistics> {
        Ok(self
            .state
            .lock()
            .partition_stats
            .get(&(table.clone(), values.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn update_partition_statistics(
        &self,
        table: &TableKey,
        values: &PartitionValues,
        stats: &Statistics,
        merge: bool,
    ) -> crate::Result<()> {
        let mut state = self.state.lock();
        let key = (table.clone(), values.clone());
        let updated = if merge {
            let old = state.partition_stats.get(&key).cloned().unwrap_or_default();
            Statistics::merge(old, stats.clone())
        } else {
            stats.clone()
        };
        state.partition_stats.insert(key, updated);
        Ok(())
    }

    fn open_transaction(&self) -> crate::Result<TransactionId> {
        let id = TransactionId(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        self.state.lock().open_transactions.push(id);
        Ok(id)
    }

    fn commit_transaction(&self, txn_id: TransactionId) -> crate::Result<()> {
        self.state.lock().open_transactions.retain(|t| *t != txn_id);
        Ok(())
    }

    fn abort_transaction(&self, txn_id: TransactionId) -> crate::Result<()> {
        self.state.lock().open_transactions.retain(|t| *t != txn_id);
        Ok(())
    }

    fn acquire_table_write_lock(
        &self,
        _txn_id: TransactionId,
        _table: &TableKey,
        _kind: WriteLockKind,
    ) -> crate::Result<()> {
        Ok(())
    }

    fn allocate_write_id(&self, _txn_id: TransactionId, _table: &TableKey) -> crate::Result<WriteId> {
        Ok(WriteId(self.next_write_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn send_transaction_heartbeat(&self, txn_id: TransactionId) -> crate::Result<()> {
        if self.state.lock().open_transactions.contains(&txn_id) {
            Ok(())
        } else {
            Err(CoordinatorError::CatalogError(format!(
                "no such open transaction {}",
                txn_id.0
            )))
        }
    }

    fn get_valid_write_ids(&self, _table: &TableKey) -> crate::Result<Vec<WriteId>> {
        Ok((1..self.next_write_id.load(Ordering::SeqCst)).map(WriteId).collect())
    }

    fn list_grants(&self, object: &str) -> crate::Result<Vec<Grant>> {
        Ok(self.state.lock().grants.get(object).cloned().unwrap_or_default())
    }

    fn grant_privileges(&self, object: &str, principal: &str, privileges: &[String]) -> crate::Result<()> {
        let mut state = self.state.lock();
        let entry = state.grants.entry(object.to_string()).or_default();
        for p in privileges {
            entry.push(Grant {
                principal: principal.to_string(),
                privilege: p.clone(),
                grantable: false,
            });
        }
        Ok(())
    }

    fn revoke_privileges(&self, object: &str, principal: &str, privileges: &[String]) -> crate::Result<()> {
        let mut state = self.state.lock();
        if let Some(entry) = state.grants.get_mut(object) {
            entry.retain(|g| !(g.principal == principal && privileges.contains(&g.privilege)));
        }
        Ok(())
    }

    fn create_role(&self, role: &str) -> crate::Result<()> {
        let mut state = self.state.lock();
        if !state.roles.iter().any(|r| r == role) {
            state.roles.push(role.to_string());
        }
        Ok(())
    }

    fn drop_role(&self, role: &str) -> crate::Result<()> {
        self.state.lock().roles.retain(|r| r != role);
        Ok(())
    }

    fn list_roles(&self) -> crate::Result<Vec<String>> {
        Ok(self.state.lock().roles.clone())
    }

    fn grant_role(&self, _role: &str, _principal: &str) -> crate::Result<()> {
        Ok(())
    }

    fn revoke_role(&self, _role: &str, _principal: &str) -> crate::Result<()> {
        Ok(())
    }
}

#[derive(Default, Clone)]
struct FsNode {
    is_dir: bool,
    size: u64,
}

/// An in-memory filesystem used as the `FilesystemDriver` fake in tests.
///
/// Paths are plain strings compared lexically; directories are tracked
/// explicitly (there is no real path-segment parsing).
#[derive(Default)]
pub struct InMemoryFilesystem {
    entries: Mutex<HashMap<String, FsNode>>,
}

impl InMemoryFilesystem {
    /// Create a file with the given size (test setup helper).
    pub fn seed_file(&self, path: &str, size: u64) {
        self.entries.lock().insert(
            path.to_string(),
            FsNode { is_dir: false, size },
        );
    }

    /// Create a directory (test setup helper).
    pub fn seed_dir(&self, path: &str) {
        self.entries
            .lock()
            .insert(path.to_string(), FsNode { is_dir: true, size: 0 });
    }

    fn parent_of(path: &str) -> Option<String> {
        path.rsplit_once('/').map(|(p, _)| p.to_string())
    }

    fn is_under(path: &str, dir: &str) -> bool {
        path == dir || path.starts_with(&format!("{dir}/"))
    }
}

impl FilesystemDriver for InMemoryFilesystem {
    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.entries.lock().contains_key(path))
    }

    fn is_dir(&self, path: &str) -> io::Result<bool> {
        Ok(self.entries.lock().get(path).map(|e| e.is_dir).unwrap_or(false))
    }

    fn mkdirs(&self, path: &str) -> io::Result<()> {
        let mut entries = self.entries.lock();
        let mut cur = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !cur.is_empty() {
                cur.push('/');
            }
            cur.push_str(segment);
            entries
                .entry(cur.clone())
                .or_insert(FsNode { is_dir: true, size: 0 });
        }
        Ok(())
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(dst) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, dst.to_string()));
        }
        if let Some(parent) = Self::parent_of(dst) {
            entries.entry(parent).or_insert(FsNode { is_dir: true, size: 0 });
        }
        let moved: Vec<(String, FsNode)> = entries
            .iter()
            .filter(|(p, _)| Self::is_under(p, src))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect();
        if moved.is_empty() {
            return Ok(false);
        }
        for (p, n) in moved {
            entries.remove(&p);
            let suffix = p.strip_prefix(src).unwrap_or("");
            entries.insert(format!("{dst}{suffix}"), n);
        }
        Ok(true)
    }

    fn delete(&self, path: &str, recursive: bool) -> io::Result<bool> {
        let mut entries = self.entries.lock();
        let is_dir = entries.get(path).map(|e| e.is_dir).unwrap_or(false);
        if is_dir && recursive {
            let doomed: Vec<String> = entries
                .keys()
                .filter(|p| Self::is_under(p, path))
                .cloned()
                .collect();
            for p in doomed {
                entries.remove(&p);
            }
            Ok(true)
        } else {
            Ok(entries.remove(path).is_some())
        }
    }

    fn list(&self, path: &str) -> io::Result<Vec<FilesystemEntry>> {
        let entries = self.entries.lock();
        let prefix = format!("{path}/");
        Ok(entries
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .map(|(p, n)| FilesystemEntry {
                path: p.clone(),
                is_dir: n.is_dir,
                size: n.size,
            })
            .collect())
    }

    fn list_files_recursive(&self, path: &str) -> io::Result<Vec<FilesystemEntry>> {
        let entries = self.entries.lock();
        let prefix = format!("{path}/");
        Ok(entries
            .iter()
            .filter(|(p, n)| p.starts_with(&prefix) && !n.is_dir)
            .map(|(p, n)| FilesystemEntry {
                path: p.clone(),
                is_dir: n.is_dir,
                size: n.size,
            })
            .collect())
    }

    fn open_input(&self, path: &str) -> io::Result<Box<dyn io::Read + Send>> {
        if self.entries.lock().contains_key(path) {
            Ok(Box::new(io::empty()))
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()))
        }
    }

    fn new_output(&self, path: &str) -> io::Result<Box<dyn io::Write + Send>> {
        self.entries.lock().insert(
            path.to_string(),
            FsNode {
                is_dir: false,
                size: 0,
            },
        );
        Ok(Box::new(io::sink()))
    }
}

/// A fixed identity/query-id pair, for tests that don't need to vary them.
pub struct StaticIdentityProvider {
    identity: Identity,
    query_id: Mutex<QueryId>,
}

impl StaticIdentityProvider {
    /// Build a provider returning a fixed identity and query id.
    pub fn new(identity: impl Into<String>, query_id: impl Into<String>) -> Self {
        StaticIdentityProvider {
            identity: Identity(identity.into()),
            query_id: Mutex::new(QueryId(query_id.into())),
        }
    }

    /// Change the query id this provider reports (simulating a new statement).
    pub fn set_query_id(&self, query_id: impl Into<String>) {
        *self.query_id.lock() = QueryId(query_id.into());
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn current_identity(&self) -> Identity {
        self.identity.clone()
    }

    fn current_query_id(&self) -> QueryId {
        self.query_id.lock().clone()
    }
}
