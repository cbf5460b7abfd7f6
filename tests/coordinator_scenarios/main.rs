//! End-to-end coordinator scenarios driven through the embedded session
//! facade ([`stc::Session`]) against the in-memory catalog and filesystem
//! fakes.
//!
//! Covers the literal scenarios and round-trip/invariant properties named
//! for this coordinator: action-log buffering, prepare/apply sequencing,
//! undo on failure, statistics merge, and the ACID interlock.

use std::collections::HashMap;
use std::sync::Arc;

use stc::{
    Action, ActionKind, BasicStatistics, Column, CoordinatorConfig, CoordinatorError, Session,
    Statistics, StorageDescriptor, Table, TableKey, WriteMode,
};
use stc_core::action::{ActionMeta, AddAction, AlterAction, DropAction, InsertExistingAction, PartitionRowDelta, RowMutationAction};
use stc_core::testing::{InMemoryFilesystem, InMemoryMetastore, StaticIdentityProvider};
use stc_core::{
    FilesystemDriver, Identity, Metastore, PartitionAction, PartitionKey, PartitionValues,
    QueryId, TableAction,
};

fn meta(query: &str) -> ActionMeta {
    ActionMeta {
        identity: Identity("alice".into()),
        query_id: QueryId(query.into()),
    }
}

fn unpartitioned_table(key: TableKey, location: &str) -> Table {
    Table {
        key,
        columns: vec![Column { name: "a".into(), type_name: "int".into() }],
        partition_columns: vec![],
        storage: StorageDescriptor::at(location),
        owner: "alice".into(),
        parameters: HashMap::new(),
        write_id: None,
    }
}

fn session(metastore: Arc<InMemoryMetastore>, filesystem: Arc<InMemoryFilesystem>, query: &str) -> Session {
    Session::new(
        CoordinatorConfig::default(),
        metastore,
        filesystem,
        Arc::new(StaticIdentityProvider::new("alice", query)),
    )
}

// ============================================================================
// Scenario 1: table create with an already-existing path
// ============================================================================

#[tokio::test]
async fn scenario_1_create_table_over_existing_path_fails_and_leaves_no_catalog_row() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());
    filesystem.seed_dir("/w/q1/new_t");
    filesystem.seed_file("/w/q1/new_t/leftover", 1);

    let mut config = CoordinatorConfig::default();
    config.creates_of_non_managed_tables_enabled = true;
    let mut s = Session::new(
        config,
        metastore.clone(),
        filesystem.clone(),
        Arc::new(StaticIdentityProvider::new("alice", "q1")),
    );

    let key = TableKey::new("db", "t");
    s.declare_write_intent(WriteMode::DirectToNew, "/w/q1/new_t".into(), key.clone())
        .unwrap();
    s.submit_table_action(
        key.clone(),
        TableAction::Add(AddAction {
            meta: meta("q1"),
            target: unpartitioned_table(key.clone(), "/w/q1/new_t"),
            ignore_existing: false,
        }),
    )
    .unwrap();

    let err = s.commit().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::PathAlreadyExists(_)));

    assert!(metastore.get_table(&key).unwrap().is_none());
    // the pre-existing directory and its contents are untouched.
    assert!(filesystem.exists("/w/q1/new_t/leftover").unwrap());
}

// ============================================================================
// Scenario 2: insert into an unpartitioned table
// ============================================================================

#[tokio::test]
async fn scenario_2_insert_existing_renames_files_and_merges_statistics() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());

    let key = TableKey::new("db", "t");
    metastore.seed_table(unpartitioned_table(key.clone(), "/t"));
    metastore.seed_table_statistics(
        key.clone(),
        Statistics {
            basic: BasicStatistics { row_count: Some(10), ..Default::default() },
            column_stats: Default::default(),
        },
    );
    filesystem.seed_dir("/t/_staging_q2");
    filesystem.seed_file("/t/_staging_q2/f_q2_0001", 100);
    filesystem.seed_file("/t/_staging_q2/f_q2_0002", 100);

    let mut s = session(metastore.clone(), filesystem.clone(), "q2");
    s.declare_write_intent(WriteMode::StageAndMove, "/t/_staging_q2".into(), key.clone())
        .unwrap();
    s.submit_table_action(
        key.clone(),
        TableAction::InsertExisting(InsertExistingAction {
            meta: meta("q2"),
            file_names: vec!["f_q2_0001".into(), "f_q2_0002".into()],
            statistics_update: Statistics {
                basic: BasicStatistics { row_count: Some(5), file_count: Some(2), ..Default::default() },
                column_stats: Default::default(),
            },
            merge: true,
        }),
    )
    .unwrap();

    s.commit().await.unwrap();

    assert!(filesystem.exists("/t/f_q2_0001").unwrap());
    assert!(filesystem.exists("/t/f_q2_0002").unwrap());
    assert!(!filesystem.exists("/t/_staging_q2").unwrap());

    let stats = metastore.get_table_statistics(&key).unwrap();
    assert_eq!(stats.basic.row_count, Some(15));
    assert_eq!(stats.basic.file_count, Some(2));
}

// ============================================================================
// Scenario 3: insert then a metastore failure during apply
// ============================================================================

struct FailingStatsMetastore {
    inner: InMemoryMetastore,
}

impl stc_core::Metastore for FailingStatsMetastore {
    fn get_database(&self, s: &str) -> stc_core::Result<Option<stc_core::StorageLocationOnly>> { self.inner.get_database(s) }
    fn create_database(&self, s: &str, l: Option<&str>) -> stc_core::Result<()> { self.inner.create_database(s, l) }
    fn drop_database(&self, s: &str, d: bool) -> stc_core::Result<()> { self.inner.drop_database(s, d) }
    fn rename_database(&self, s: &str, n: &str) -> stc_core::Result<()> { self.inner.rename_database(s, n) }
    fn list_tables(&self, s: &str) -> stc_core::Result<Vec<String>> { self.inner.list_tables(s) }
    fn get_table(&self, k: &TableKey) -> stc_core::Result<Option<Table>> { self.inner.get_table(k) }
    fn create_table(&self, t: &Table) -> stc_core::Result<()> { self.inner.create_table(t) }
    fn replace_table(&self, t: &Table) -> stc_core::Result<()> { self.inner.replace_table(t) }
    fn alter_transactional_table(&self, t: &Table, txn: stc_core::TransactionId, w: stc_core::WriteId) -> stc_core::Result<()> {
        self.inner.alter_transactional_table(t, txn, w)
    }
    fn drop_table(&self, k: &TableKey, d: bool) -> stc_core::Result<()> { self.inner.drop_table(k, d) }
    fn get_partition(&self, t: &TableKey, v: &PartitionValues) -> stc_core::Result<Option<stc_core::Partition>> { self.inner.get_partition(t, v) }
    fn get_partition_names_by_filter(&self, t: &TableKey, f: &str) -> stc_core::Result<Vec<String>> { self.inner.get_partition_names_by_filter(t, f) }
    fn get_partitions_by_names(&self, t: &TableKey, n: &[String]) -> stc_core::Result<Vec<stc_core::Partition>> { self.inner.get_partitions_by_names(t, n) }
    fn add_partitions(&self, t: &TableKey, p: &[stc_core::Partition]) -> stc_core::Result<()> { self.inner.add_partitions(t, p) }
    fn alter_partition(&self, p: &stc_core::Partition) -> stc_core::Result<()> { self.inner.alter_partition(p) }
    fn drop_partition(&self, t: &TableKey, v: &PartitionValues, d: bool) -> stc_core::Result<()> { self.inner.drop_partition(t, v, d) }
    fn get_table_statistics(&self, t: &TableKey) -> stc_core::Result<Statistics> { self.inner.get_table_statistics(t) }
    fn update_table_statistics(&self, _t: &TableKey, _s: &Statistics, _m: bool) -> stc_core::Result<()> {
        Err(CoordinatorError::CatalogError("simulated metastore outage".into()))
    }
    fn get_partition_statistics(&self, t: &TableKey, v: &PartitionValues) -> stc_core::Result<Statistics> { self.inner.get_partition_statistics(t, v) }
    fn update_partition_statistics(&self, t: &TableKey, v: &PartitionValues, s: &Statistics, m: bool) -> stc_core::Result<()> {
        self.inner.update_partition_statistics(t, v, s, m)
    }
    fn open_transaction(&self) -> stc_core::Result<stc_core::TransactionId> { self.inner.open_transaction() }
    fn commit_transaction(&self, t: stc_core::TransactionId) -> stc_core::Result<()> { self.inner.commit_transaction(t) }
    fn abort_transaction(&self, t: stc_core::TransactionId) -> stc_core::Result<()> { self.inner.abort_transaction(t) }
    fn acquire_table_write_lock(&self, t: stc_core::TransactionId, k: &TableKey, l: stc_core::WriteLockKind) -> stc_core::Result<()> {
        self.inner.acquire_table_write_lock(t, k, l)
    }
    fn allocate_write_id(&self, t: stc_core::TransactionId, k: &TableKey) -> stc_core::Result<stc_core::WriteId> { self.inner.allocate_write_id(t, k) }
    fn send_transaction_heartbeat(&self, t: stc_core::TransactionId) -> stc_core::Result<()> { self.inner.send_transaction_heartbeat(t) }
    fn get_valid_write_ids(&self, t: &TableKey) -> stc_core::Result<Vec<stc_core::WriteId>> { self.inner.get_valid_write_ids(t) }
    fn list_grants(&self, o: &str) -> stc_core::Result<Vec<stc_core::Grant>> { self.inner.list_grants(o) }
    fn grant_privileges(&self, o: &str, p: &str, pr: &[String]) -> stc_core::Result<()> { self.inner.grant_privileges(o, p, pr) }
    fn revoke_privileges(&self, o: &str, p: &str, pr: &[String]) -> stc_core::Result<()> { self.inner.revoke_privileges(o, p, pr) }
    fn create_role(&self, r: &str) -> stc_core::Result<()> { self.inner.create_role(r) }
    fn drop_role(&self, r: &str) -> stc_core::Result<()> { self.inner.drop_role(r) }
    fn list_roles(&self) -> stc_core::Result<Vec<String>> { self.inner.list_roles() }
    fn grant_role(&self, r: &str, p: &str) -> stc_core::Result<()> { self.inner.grant_role(r, p) }
    fn revoke_role(&self, r: &str, p: &str) -> stc_core::Result<()> { self.inner.revoke_role(r, p) }
}

#[tokio::test]
async fn scenario_3_metastore_failure_during_apply_renames_files_back_and_leaves_stats_untouched() {
    let inner = InMemoryMetastore::default();
    let key = TableKey::new("db", "t");
    inner.seed_table(unpartitioned_table(key.clone(), "/t"));
    inner.seed_table_statistics(
        key.clone(),
        Statistics {
            basic: BasicStatistics { row_count: Some(10), ..Default::default() },
            column_stats: Default::default(),
        },
    );
    let metastore: Arc<dyn stc_core::Metastore> = Arc::new(FailingStatsMetastore { inner });
    let filesystem = Arc::new(InMemoryFilesystem::default());
    filesystem.seed_dir("/t/_staging_q2");
    filesystem.seed_file("/t/_staging_q2/f_q2_0001", 100);
    filesystem.seed_file("/t/_staging_q2/f_q2_0002", 100);

    let mut s = Session::new(
        CoordinatorConfig::default(),
        metastore.clone(),
        filesystem.clone(),
        Arc::new(StaticIdentityProvider::new("alice", "q2")),
    );
    s.declare_write_intent(WriteMode::StageAndMove, "/t/_staging_q2".into(), key.clone())
        .unwrap();
    s.submit_table_action(
        key.clone(),
        TableAction::InsertExisting(InsertExistingAction {
            meta: meta("q2"),
            file_names: vec!["f_q2_0001".into(), "f_q2_0002".into()],
            statistics_update: Statistics {
                basic: BasicStatistics { row_count: Some(5), ..Default::default() },
                column_stats: Default::default(),
            },
            merge: true,
        }),
    )
    .unwrap();

    let err = s.commit().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::CatalogError(_) | CoordinatorError::Aggregate { .. }));

    assert!(!filesystem.exists("/t/f_q2_0001").unwrap());
    assert!(!filesystem.exists("/t/f_q2_0002").unwrap());
    assert!(!filesystem.exists("/t/_staging_q2").unwrap());

    let stats = metastore.get_table_statistics(&key).unwrap();
    assert_eq!(stats.basic.row_count, Some(10));
}

// ============================================================================
// Scenario 4: row-level delete on a partitioned ACID table
// ============================================================================

#[tokio::test]
async fn scenario_4_delete_rows_adjusts_partition_statistics_and_closes_the_acid_transaction() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());

    let key = TableKey::new("db", "p");
    let table = Table {
        key: key.clone(),
        columns: vec![],
        partition_columns: vec!["d".into()],
        storage: StorageDescriptor::at("/p"),
        owner: "alice".into(),
        parameters: HashMap::new(),
        write_id: None,
    };
    metastore.seed_table(table);
    let d1 = PartitionValues::new(vec!["1".into()]);
    let d2 = PartitionValues::new(vec!["2".into()]);
    metastore.seed_partition_statistics(
        key.clone(),
        d1.clone(),
        Statistics { basic: BasicStatistics { row_count: Some(100), ..Default::default() }, column_stats: Default::default() },
    );
    metastore.seed_partition_statistics(
        key.clone(),
        d2.clone(),
        Statistics { basic: BasicStatistics { row_count: Some(50), ..Default::default() }, column_stats: Default::default() },
    );
    metastore.seed_table_statistics(
        key.clone(),
        Statistics { basic: BasicStatistics { row_count: Some(150), ..Default::default() }, column_stats: Default::default() },
    );

    let mut s = session(metastore.clone(), filesystem.clone(), "q4");
    s.begin_delete(key.clone()).unwrap();
    // Our model buffers DELETE_ROWS once per table; each partition's row
    // delta travels in the same action's delta list (§4.5).
    s.submit_table_action(
        key.clone(),
        TableAction::DeleteRows(RowMutationAction {
            meta: meta("q4"),
            deltas: vec![
                PartitionRowDelta { partition_values: Some(d1.clone()), rows: 3, delta_dir: "/p/d=1/delete_delta_0000005_0000005_0000".into(), statement_id: None },
                PartitionRowDelta { partition_values: Some(d2.clone()), rows: 1, delta_dir: "/p/d=2/delete_delta_0000005_0000005_0000".into(), statement_id: None },
            ],
        }),
    )
    .unwrap();

    s.commit().await.unwrap();

    let table_stats = metastore.get_table_statistics(&key).unwrap();
    assert_eq!(table_stats.basic.row_count, Some(146));

    // DELETE_ROWS (unlike UPDATE) also adjusts each affected partition's
    // own row count.
    let d1_stats = metastore.get_partition_statistics(&key, &d1).unwrap();
    assert_eq!(d1_stats.basic.row_count, Some(97));
    let d2_stats = metastore.get_partition_statistics(&key, &d2).unwrap();
    assert_eq!(d2_stats.basic.row_count, Some(49));
}

// ============================================================================
// Scenario 5: in-place ALTER (schema change, location unchanged)
// ============================================================================

#[tokio::test]
async fn scenario_5_in_place_alter_preserves_data_through_the_temp_rename_dance() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());

    let key = TableKey::new("db", "t");
    metastore.seed_table(unpartitioned_table(key.clone(), "/t"));
    filesystem.seed_dir("/t");
    filesystem.seed_file("/t/part-0000", 42);

    let mut altered = unpartitioned_table(key.clone(), "/t");
    altered.columns.push(Column { name: "b".into(), type_name: "string".into() });

    let mut s = session(metastore.clone(), filesystem.clone(), "q10");
    s.submit_table_action(
        key.clone(),
        TableAction::Alter(AlterAction { meta: meta("q10"), target: altered }),
    )
    .unwrap();

    s.commit().await.unwrap();

    // The in-place rename dance swings the directory aside and back; the
    // pre-existing file under it survives the round trip untouched.
    assert!(filesystem.exists("/t/part-0000").unwrap());

    let after = metastore.get_table(&key).unwrap().unwrap();
    assert_eq!(after.columns.len(), 2);
    assert_eq!(after.storage.location, Some("/t".into()));
}

// ============================================================================
// Round-trip and invariant properties (§8)
// ============================================================================

#[tokio::test]
async fn begin_and_rollback_with_no_actions_leaves_everything_untouched() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());
    let key = TableKey::new("db", "t");
    metastore.seed_table(unpartitioned_table(key.clone(), "/t"));

    let s = session(metastore.clone(), filesystem.clone(), "q0");
    s.rollback().await.unwrap();

    assert!(metastore.get_table(&key).unwrap().is_some());
}

#[tokio::test]
async fn drop_preserve_data_removes_catalog_row_but_leaves_data_directory_intact() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());
    let key = TableKey::new("db", "p");
    metastore.seed_table(Table {
        key: key.clone(),
        columns: vec![],
        partition_columns: vec!["d".into()],
        storage: StorageDescriptor::at("/p"),
        owner: "alice".into(),
        parameters: HashMap::new(),
        write_id: None,
    });
    filesystem.seed_dir("/p/d=1");
    filesystem.seed_file("/p/d=1/f0", 10);

    let values = PartitionValues::new(vec!["1".into()]);
    let partition = stc_core::Partition {
        table: key.clone(),
        values: values.clone(),
        storage: StorageDescriptor::at("/p/d=1"),
        parameters: HashMap::new(),
    };
    metastore.seed_partition(partition);

    let pkey = PartitionKey::new(key.clone(), values.clone());
    let mut s = session(metastore.clone(), filesystem.clone(), "q5");
    s.submit_partition_action(
        pkey,
        PartitionAction::DropPreserveData(DropAction { meta: meta("q5"), description: "drop db.p/d=1 preserve data".into() }),
    )
    .unwrap();

    s.commit().await.unwrap();

    assert!(metastore.get_partition(&key, &values).unwrap().is_none());
    assert!(filesystem.exists("/p/d=1/f0").unwrap());
}

#[tokio::test]
async fn drop_then_alter_recreates_the_table_in_the_same_transaction() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());
    let key = TableKey::new("db", "t");
    metastore.seed_table(unpartitioned_table(key.clone(), "/t"));

    let mut s = session(metastore.clone(), filesystem.clone(), "q6");
    s.submit_table_action(
        key.clone(),
        TableAction::Drop(DropAction { meta: meta("q6"), description: "drop db.t".into() }),
    )
    .unwrap();
    s.submit_table_action(
        key.clone(),
        TableAction::Alter(AlterAction { meta: meta("q6"), target: unpartitioned_table(key.clone(), "/t_v2") }),
    )
    .unwrap();

    s.commit().await.unwrap();

    let after = metastore.get_table(&key).unwrap().unwrap();
    assert_eq!(after.storage.location, Some("/t_v2".into()));
}

#[tokio::test]
async fn drop_then_add_is_rejected_as_unsupported_sequence() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());
    let key = TableKey::new("db", "t");
    metastore.seed_table(unpartitioned_table(key.clone(), "/t"));

    let mut s = session(metastore.clone(), filesystem.clone(), "q7");
    s.submit_table_action(
        key.clone(),
        TableAction::Drop(DropAction { meta: meta("q7"), description: "drop db.t".into() }),
    )
    .unwrap();

    let err = s
        .submit_table_action(
            key.clone(),
            TableAction::Add(AddAction { meta: meta("q7"), target: unpartitioned_table(key.clone(), "/t"), ignore_existing: false }),
        )
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::UnsupportedSequence { .. }));
}

#[tokio::test]
async fn scenario_6_concurrent_external_drop_surfaces_as_transaction_conflict() {
    let metastore = Arc::new(InMemoryMetastore::default());
    let filesystem = Arc::new(InMemoryFilesystem::default());
    let key = TableKey::new("db", "t");
    metastore.seed_table(unpartitioned_table(key.clone(), "/t"));

    let mut s = session(metastore.clone(), filesystem.clone(), "q8");
    s.submit_table_action(
        key.clone(),
        TableAction::Alter(AlterAction { meta: meta("q8"), target: unpartitioned_table(key.clone(), "/t") }),
    )
    .unwrap();

    // An external actor drops the table after our action was buffered but
    // before we apply it.
    metastore.drop_table(&key, true).unwrap();

    let err = s.commit().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::TransactionConflict { .. }));
}

#[tokio::test]
async fn action_kinds_round_trip_through_submission() {
    assert_eq!(
        Action::<Table>::Drop(DropAction { meta: meta("q9"), description: "x".into() }).kind(),
        ActionKind::Drop
    );
}
