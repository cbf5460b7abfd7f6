use std::sync::Arc;

use stc_core::{
    CoordinatorConfig, DeclarationId, FilesystemDriver, Grant, Identity, IdentityProvider,
    Metastore, Partition, PartitionAction, PartitionKey, PartitionValues, QueryId, Result,
    SchemaName, Statistics, Table, TableAction, TableKey, TransactionId, WriteLockKind, WriteMode,
};
use stc_engine::Coordinator;

/// One embedding session, spanning exactly one coordinator transaction.
///
/// Construct with [`Session::new`], drive it through reads and submissions,
/// and end it with [`Session::commit`] or [`Session::rollback`] — both
/// consume `self`, matching the one-shot lifecycle of the underlying
/// [`Coordinator`].
pub struct Session {
    coordinator: Coordinator,
    current_query_id: Option<QueryId>,
}

impl Session {
    /// Open a new session (and transaction) against the given collaborators.
    pub fn new(
        config: CoordinatorConfig,
        metastore: Arc<dyn Metastore>,
        filesystem: Arc<dyn FilesystemDriver>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Session {
            coordinator: Coordinator::new(config, metastore, filesystem, identity),
            current_query_id: None,
        }
    }

    /// Mark the start of a new top-level statement, recording its query id
    /// for subsequent `cleanup_query` scoping.
    pub fn begin_query(&mut self, query_id: QueryId) {
        self.current_query_id = Some(query_id);
    }

    /// The query id passed to the most recent [`Session::begin_query`], if any.
    pub fn current_query_id(&self) -> Option<&QueryId> {
        self.current_query_id.as_ref()
    }

    /// Open (or reuse) the ACID transaction backing an `INSERT` into `table`
    /// and acquire its write lock.
    pub fn begin_insert(&mut self, table: TableKey) -> Result<TransactionId> {
        self.begin_write(table, WriteLockKind::Insert)
    }

    /// Open (or reuse) the ACID transaction backing a row-level `DELETE`
    /// against `table` and acquire its write lock.
    pub fn begin_delete(&mut self, table: TableKey) -> Result<TransactionId> {
        self.begin_write(table, WriteLockKind::Delete)
    }

    /// Open (or reuse) the ACID transaction backing a row-level `UPDATE`
    /// against `table` and acquire its write lock.
    pub fn begin_update(&mut self, table: TableKey) -> Result<TransactionId> {
        self.begin_write(table, WriteLockKind::Update)
    }

    fn begin_write(&mut self, table: TableKey, kind: WriteLockKind) -> Result<TransactionId> {
        let txn_id = self.coordinator.open_acid_transaction(table.clone())?;
        self.coordinator.acquire_write_lock(&table, kind)?;
        Ok(txn_id)
    }

    // ---- Reads ----

    /// See [`Coordinator::get_table`].
    pub fn get_table(&mut self, key: &TableKey) -> Result<Option<Table>> {
        self.coordinator.get_table(key)
    }

    /// See [`Coordinator::list_tables`].
    pub fn list_tables(&mut self, schema: &SchemaName) -> Result<Vec<String>> {
        self.coordinator.list_tables(schema)
    }

    /// See [`Coordinator::get_partition`].
    pub fn get_partition(&mut self, table: &TableKey, values: &PartitionValues) -> Result<Option<Partition>> {
        self.coordinator.get_partition(table, values)
    }

    /// See [`Coordinator::get_table_statistics`].
    pub fn get_table_statistics(&mut self, table: &TableKey) -> Result<Statistics> {
        self.coordinator.get_table_statistics(table)
    }

    /// See [`Coordinator::get_partition_statistics`].
    pub fn get_partition_statistics(&mut self, table: &TableKey, values: &PartitionValues) -> Result<Statistics> {
        self.coordinator.get_partition_statistics(table, values)
    }

    /// See [`Coordinator::get_partition_names_by_filter`].
    pub fn get_partition_names_by_filter(&mut self, table: &TableKey, filter: &str) -> Result<Vec<String>> {
        self.coordinator.get_partition_names_by_filter(table, filter)
    }

    /// See [`Coordinator::get_partitions_by_names`].
    pub fn get_partitions_by_names(&mut self, table: &TableKey, names: &[String]) -> Result<Vec<Partition>> {
        self.coordinator.get_partitions_by_names(table, names)
    }

    // ---- Write intents and buffered actions ----

    /// See [`Coordinator::declare_write_intent`].
    pub fn declare_write_intent(&mut self, mode: WriteMode, staging_root: String, target_table: TableKey) -> Result<DeclarationId> {
        self.coordinator.declare_write_intent(mode, staging_root, target_table)
    }

    /// See [`Coordinator::drop_intent`].
    pub fn drop_intent(&mut self, id: DeclarationId) -> Result<()> {
        self.coordinator.drop_intent(id)
    }

    /// See [`Coordinator::submit_table_action`].
    pub fn submit_table_action(&mut self, key: TableKey, action: TableAction) -> Result<()> {
        self.coordinator.submit_table_action(key, action)
    }

    /// See [`Coordinator::submit_partition_action`].
    pub fn submit_partition_action(&mut self, key: PartitionKey, action: PartitionAction) -> Result<()> {
        self.coordinator.submit_partition_action(key, action)
    }

    /// Scrub everything `query_id` has staged so far, without ending the
    /// transaction.
    pub fn cleanup_query(&mut self, query_id: &QueryId) -> Result<()> {
        self.coordinator.cleanup_query(query_id)
    }

    // ---- Schema lifecycle, grants, and roles ----

    /// See [`Coordinator::create_database`].
    pub fn create_database(&mut self, schema: &str, location: Option<&str>) -> Result<()> {
        self.coordinator.create_database(schema, location)
    }

    /// See [`Coordinator::drop_database`].
    pub fn drop_database(&mut self, schema: &str) -> Result<()> {
        self.coordinator.drop_database(schema)
    }

    /// See [`Coordinator::rename_database`].
    pub fn rename_database(&mut self, schema: &str, new_name: &str) -> Result<()> {
        self.coordinator.rename_database(schema, new_name)
    }

    /// See [`Coordinator::list_grants`].
    pub fn list_grants(&mut self, object: &str) -> Result<Vec<Grant>> {
        self.coordinator.list_grants(object)
    }

    /// See [`Coordinator::grant_privileges`].
    pub fn grant_privileges(&mut self, object: &str, principal: &str, privileges: &[String]) -> Result<()> {
        self.coordinator.grant_privileges(object, principal, privileges)
    }

    /// See [`Coordinator::revoke_privileges`].
    pub fn revoke_privileges(&mut self, object: &str, principal: &str, privileges: &[String]) -> Result<()> {
        self.coordinator.revoke_privileges(object, principal, privileges)
    }

    /// See [`Coordinator::create_role`].
    pub fn create_role(&mut self, role: &str) -> Result<()> {
        self.coordinator.create_role(role)
    }

    /// See [`Coordinator::drop_role`].
    pub fn drop_role(&mut self, role: &str) -> Result<()> {
        self.coordinator.drop_role(role)
    }

    /// See [`Coordinator::list_roles`].
    pub fn list_roles(&mut self) -> Result<Vec<String>> {
        self.coordinator.list_roles()
    }

    /// See [`Coordinator::grant_role`].
    pub fn grant_role(&mut self, role: &str, principal: &str) -> Result<()> {
        self.coordinator.grant_role(role, principal)
    }

    /// See [`Coordinator::revoke_role`].
    pub fn revoke_role(&mut self, role: &str, principal: &str) -> Result<()> {
        self.coordinator.revoke_role(role, principal)
    }

    /// The caller identity driving this session.
    pub fn identity(&self) -> Identity {
        self.coordinator.identity()
    }

    // ---- Terminal operations ----

    /// Commit the transaction.
    pub async fn commit(self) -> Result<()> {
        self.coordinator.commit().await
    }

    /// Roll back the transaction.
    pub async fn rollback(self) -> Result<()> {
        self.coordinator.rollback().await
    }
}
