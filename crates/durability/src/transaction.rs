//! One open ACID transaction against the external catalog (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use stc_core::{CoordinatorConfig, Metastore, Result, TableKey, TransactionId, WriteId, WriteLockKind};

use crate::heartbeat::HeartbeatHandle;

/// An open transaction, plus the bookkeeping the coordinator needs around
/// it: one write-id per table (allocated at most once, idempotently), and a
/// lazily-fetched, cached snapshot of valid write-ids per table for
/// consistent reads within the transaction.
pub struct AcidTransaction {
    txn_id: TransactionId,
    metastore: Arc<dyn Metastore>,
    heartbeat: Option<HeartbeatHandle>,
    write_ids: Mutex<HashMap<TableKey, WriteId>>,
    valid_write_ids: Mutex<HashMap<TableKey, Vec<WriteId>>>,
}

impl AcidTransaction {
    /// Open a new transaction with the catalog, starting a background
    /// heartbeat if `config` enables one.
    pub fn open(metastore: Arc<dyn Metastore>, config: &CoordinatorConfig) -> Result<Self> {
        let txn_id = metastore.open_transaction()?;
        let heartbeat = config
            .hive_transaction_heartbeat_interval
            .map(|interval| HeartbeatHandle::spawn(metastore.clone(), txn_id, interval));
        tracing::debug!(target: "stc::durability", txn_id = txn_id.0, "transaction opened");
        Ok(AcidTransaction {
            txn_id,
            metastore,
            heartbeat,
            write_ids: Mutex::new(HashMap::new()),
            valid_write_ids: Mutex::new(HashMap::new()),
        })
    }

    /// This transaction's id.
    pub fn id(&self) -> TransactionId {
        self.txn_id
    }

    /// Acquire a table write lock for the given operation kind.
    pub fn acquire_write_lock(&self, table: &TableKey, kind: WriteLockKind) -> Result<()> {
        self.metastore.acquire_table_write_lock(self.txn_id, table, kind)
    }

    /// Allocate (or return the already-allocated) write-id for `table`
    /// within this transaction. A table gets exactly one write-id per
    /// transaction regardless of how many actions target it.
    pub fn allocate_write_id(&self, table: &TableKey) -> Result<WriteId> {
        if let Some(id) = self.write_ids.lock().get(table).copied() {
            return Ok(id);
        }
        let id = self.metastore.allocate_write_id(self.txn_id, table)?;
        self.write_ids.lock().insert(table.clone(), id);
        Ok(id)
    }

    /// The write-id allocation table has already produced for `table`, if any.
    pub fn allocated_write_id(&self, table: &TableKey) -> Option<WriteId> {
        self.write_ids.lock().get(table).copied()
    }

    /// The set of write-ids valid for snapshot reads of `table`, fetched
    /// once and cached for the rest of this transaction (§4.2 "a read
    /// sees a consistent snapshot for its whole duration").
    pub fn valid_write_ids(&self, table: &TableKey) -> Result<Vec<WriteId>> {
        if let Some(ids) = self.valid_write_ids.lock().get(table).cloned() {
            return Ok(ids);
        }
        let ids = self.metastore.get_valid_write_ids(table)?;
        self.valid_write_ids.lock().insert(table.clone(), ids.clone());
        Ok(ids)
    }

    /// Commit the transaction, stopping the heartbeat first.
    pub async fn commit(mut self) -> Result<()> {
        self.stop_heartbeat().await;
        tracing::debug!(target: "stc::durability", txn_id = self.txn_id.0, "committing transaction");
        self.metastore.commit_transaction(self.txn_id)
    }

    /// Abort the transaction, stopping the heartbeat first. Best-effort:
    /// callers invoke this from an already-failing rollback path and should
    /// attach any error here as a suppressed cause rather than replace
    /// their primary error with it.
    pub async fn abort(mut self) -> Result<()> {
        self.stop_heartbeat().await;
        tracing::debug!(target: "stc::durability", txn_id = self.txn_id.0, "aborting transaction");
        self.metastore.abort_transaction(self.txn_id)
    }

    async fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.stop().await;
        }
    }
}
