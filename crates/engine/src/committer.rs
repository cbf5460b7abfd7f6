//! The Committer (C5): §4.5.
//!
//! Walks the buffered action log in strict phase order — ADD table, ALTER
//! table, ALTER partition, ADD partition (batched), then the
//! `INSERT_EXISTING`/`DELETE_ROWS`/`UPDATE` statistics-bearing ops —
//! recording an [`stc_storage::UndoTask`] for every reversible step as it
//! goes. `DROP`/`DROP_PRESERVE_DATA` are irreversible once applied, so they
//! never run until every phase above has succeeded. A failure in any
//! reversible phase undoes the catalog rows those phases already created
//! and runs the abort stack (most recently pushed task first); success
//! instead runs the irreversible drops, then the finish stack, where
//! superseded directories are actually deleted. Every abort-time failure —
//! filesystem undo, catalog undo, or ACID abort — is logged and swallowed
//! rather than surfaced: only the original failure is ever returned (§4.6, §7).

use std::collections::HashMap;
use std::sync::Arc;

use stc_concurrency::{ActionLog, IntentRegistry};
use stc_core::action::{ActionKind, AddAction, AlterAction, InsertExistingAction, RowMutationAction};
use stc_core::{
    Action, CoordinatorConfig, CoordinatorError, FilesystemDriver, Metastore, Partition, PartitionKey,
    PartitionValues, Result, Statistics, Table, TableKey, WriteMode,
};
use stc_durability::AcidTransaction;
use stc_storage::{rename_directory, AsyncRenameBatch, UndoStacks, UndoTask};

use crate::statistics::{
    apply_row_adjustment, fetch_partition_statistics_or_empty, fetch_table_statistics_or_empty,
    merge_insert_existing, row_delta_adjustment,
};

/// `Table.parameters` key stamped with the query id that created a row, so
/// a retried `CREATE TABLE` from the same query can be told apart from a
/// genuine name collision with someone else's table (§4.5 step 1).
const CREATE_QUERY_ID_PARAM: &str = "stc.create_query_id";

fn fs_err(e: std::io::Error) -> CoordinatorError {
    CoordinatorError::FilesystemError(e.to_string())
}

/// Catalog rows created during the reversible phases, so a later failure in
/// the same commit can undo them (§4.5, §9).
#[derive(Default)]
struct CreatedRows {
    tables: Vec<TableKey>,
    partitions: Vec<(TableKey, PartitionValues)>,
}

/// Commit every buffered action. On success, open ACID transactions are
/// committed and consumed; on failure they are aborted and consumed, and
/// every abort-time error (filesystem undo, catalog undo, ACID abort) is
/// logged rather than attached to the returned error.
pub async fn commit(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    action_log: &ActionLog,
    intents: &IntentRegistry,
    mut acid_txns: HashMap<TableKey, AcidTransaction>,
) -> Result<()> {
    enforce_partition_drop_limit(config, action_log)?;

    let mut undo = UndoStacks::new();
    let mut created = CreatedRows::default();
    let body = run_body(config, metastore, filesystem, action_log, intents, &acid_txns, &mut undo, &mut created).await;

    match body {
        Ok(()) => {
            let drop_result = run_irreversible_phase(metastore, action_log, &mut undo);

            for e in undo.run_finish(filesystem.as_ref()) {
                tracing::warn!(target: "stc::engine", error = %e, "best-effort finish cleanup reported an error");
            }

            let mut commit_errors = Vec::new();
            for (_, txn) in acid_txns.drain() {
                if let Err(e) = txn.commit().await {
                    commit_errors.push(e);
                }
            }
            if let Some(e) = stc_storage::aggregate_errors("ACID transaction commit", commit_errors) {
                return Err(e);
            }

            drop_result?;
            Ok(())
        }
        Err(primary) => {
            undo_created_rows(metastore.as_ref(), &created);

            for e in undo.run_abort(filesystem.as_ref()) {
                tracing::warn!(target: "stc::engine", error = %e, "abort-phase filesystem undo reported an error");
            }

            for (_, txn) in acid_txns.drain() {
                if let Err(e) = txn.abort().await {
                    tracing::warn!(target: "stc::engine", error = %e, "ACID transaction abort reported an error");
                }
            }

            Err(primary)
        }
    }
}

fn enforce_partition_drop_limit(config: &CoordinatorConfig, action_log: &ActionLog) -> Result<()> {
    let drops = action_log
        .iter_partition_actions()
        .filter(|(_, a)| matches!(a.kind(), ActionKind::Drop | ActionKind::DropPreserveData))
        .count();
    if drops > config.max_partition_drops_per_query {
        return Err(CoordinatorError::UnsupportedMix(format!(
            "batch drops {drops} partitions, exceeding the configured limit of {}",
            config.max_partition_drops_per_query
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_body(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    action_log: &ActionLog,
    intents: &IntentRegistry,
    acid_txns: &HashMap<TableKey, AcidTransaction>,
    undo: &mut UndoStacks,
    created: &mut CreatedRows,
) -> Result<()> {
    // Phase 1: ADD table.
    for (key, action) in action_log.iter_table_actions() {
        if let Action::Add(a) = action {
            apply_add_table(config, metastore, filesystem, undo, created, key, a)?;
        }
    }

    // Phase 2: ALTER table.
    for (key, action) in action_log.iter_table_actions() {
        if let Action::Alter(a) = action {
            apply_alter_table(config, metastore, filesystem, intents, acid_txns, undo, key, a)?;
        }
    }

    // Phase 3: ALTER partition.
    for (_, action) in action_log.iter_partition_actions() {
        if let Action::Alter(a) = action {
            metastore.alter_partition(&a.target)?;
        }
    }

    // Phase 4: ADD partition, batched per table.
    let mut pending_adds: HashMap<TableKey, Vec<Partition>> = HashMap::new();
    for (key, action) in action_log.iter_partition_actions() {
        if let Action::Add(a) = action {
            pending_adds.entry(key.table.clone()).or_default().push(a.target.clone());
        }
    }
    for (table, partitions) in pending_adds {
        apply_add_partitions(config, metastore, filesystem, intents, undo, created, &table, &partitions)?;
    }

    // Phase 5: INSERT_EXISTING / DELETE_ROWS / UPDATE.
    for (key, action) in action_log.iter_table_actions() {
        match action {
            Action::InsertExisting(ie) => {
                apply_table_insert_existing(config, metastore, filesystem, intents, undo, key, ie).await?;
            }
            Action::DeleteRows(r) => apply_table_row_mutation(config, metastore, acid_txns, undo, key, ActionKind::DeleteRows, r)?,
            Action::Update(r) => apply_table_row_mutation(config, metastore, acid_txns, undo, key, ActionKind::Update, r)?,
            _ => {}
        }
    }
    for (key, action) in action_log.iter_partition_actions() {
        if let Action::InsertExisting(ie) = action {
            apply_partition_insert_existing(config, metastore, filesystem, intents, undo, key, ie).await?;
        }
    }

    Ok(())
}

fn apply_add_table(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    undo: &mut UndoStacks,
    created: &mut CreatedRows,
    key: &TableKey,
    a: &AddAction<Table>,
) -> Result<()> {
    let mut table = a.target.clone();
    let query_id = a.meta.query_id.0.clone();

    if let Some(loc) = table.storage.location.clone() {
        if !table.is_managed_location() && !config.creates_of_non_managed_tables_enabled {
            return Err(CoordinatorError::UnsupportedMix(format!(
                "creating table {key} with an explicit, catalog-unmanaged location is disabled"
            )));
        }
        if directory_is_occupied(filesystem.as_ref(), &loc)? {
            return Err(CoordinatorError::PathAlreadyExists(loc));
        }
        filesystem.mkdirs(&loc).map_err(fs_err)?;
        undo.push_abort(UndoTask::CleanupOnAbort {
            path: loc,
            query_id: None,
            delete_empty_directories: config.delete_empty_directories,
        });
    }

    table.parameters.insert(CREATE_QUERY_ID_PARAM.to_string(), query_id.clone());

    match metastore.create_table(&table) {
        Ok(()) => {
            created.tables.push(key.clone());
            metastore.update_table_statistics(key, &Statistics::default(), false)?;
            Ok(())
        }
        Err(CoordinatorError::TableAlreadyExists(_)) => {
            if a.ignore_existing {
                return Ok(());
            }
            let existing = metastore
                .get_table(key)?
                .ok_or_else(|| CoordinatorError::TableAlreadyExists(key.clone()))?;
            let same_retry = existing.parameters.get(CREATE_QUERY_ID_PARAM) == Some(&query_id)
                && existing.columns == table.columns
                && existing.partition_columns == table.partition_columns;
            if same_retry {
                tracing::info!(target: "stc::engine", table = %key, "create_table is an idempotent retry");
                Ok(())
            } else {
                Err(CoordinatorError::TransactionConflict {
                    key: key.to_string(),
                    reason: "a table with this name already exists".to_string(),
                })
            }
        }
        Err(e) => Err(e),
    }
}

/// Whether `loc` already names a directory with visible entries — `ADD`
/// must never silently adopt another writer's files (§8 scenario 1).
fn directory_is_occupied(filesystem: &dyn FilesystemDriver, loc: &str) -> Result<bool> {
    if !filesystem.exists(loc).map_err(fs_err)? {
        return Ok(false);
    }
    if !filesystem.is_dir(loc).map_err(fs_err)? {
        return Ok(true);
    }
    Ok(!filesystem.list(loc).map_err(fs_err)?.is_empty())
}

#[allow(clippy::too_many_arguments)]
fn apply_alter_table(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    intents: &IntentRegistry,
    acid_txns: &HashMap<TableKey, AcidTransaction>,
    undo: &mut UndoStacks,
    key: &TableKey,
    a: &AlterAction<Table>,
) -> Result<()> {
    let old = metastore.get_table(key)?.ok_or_else(|| CoordinatorError::TransactionConflict {
        key: key.to_string(),
        reason: "table was dropped concurrently before apply".to_string(),
    })?;

    let old_loc = old.storage.location.clone();
    let target_loc = a.target.storage.location.clone();

    if let (Some(old_loc), Some(target_loc)) = (&old_loc, &target_loc) {
        if old_loc == target_loc {
            // In-place ALTER: swing the live directory aside under a
            // sibling temp name, then back into place, so a writer that
            // staged straight into the target directory can be undone by
            // a plain rename-back if apply fails partway through.
            if filesystem.exists(old_loc).map_err(fs_err)? {
                let temp = sibling_temp_path(target_loc, &key.table_name.0, &a.meta.query_id.0);
                rename_directory(filesystem.as_ref(), old_loc, &temp)?;
                undo.push_abort(UndoTask::RenameBackOnAbort {
                    current: temp.clone(),
                    original: old_loc.clone(),
                });
                rename_directory(filesystem.as_ref(), &temp, target_loc)?;
                undo.push_abort(UndoTask::RenameBackOnAbort {
                    current: target_loc.clone(),
                    original: old_loc.clone(),
                });
            }
        } else if let Some(staged) = stage_and_move_root(intents, key) {
            if &staged != target_loc && filesystem.exists(&staged).map_err(fs_err)? {
                rename_directory(filesystem.as_ref(), &staged, target_loc)?;
                undo.push_abort(UndoTask::CleanupOnAbort {
                    path: target_loc.clone(),
                    query_id: None,
                    delete_empty_directories: config.delete_empty_directories,
                });
            }
        }
    }

    let applied = if let Some(write_id) = a.target.write_id {
        let txn = acid_txns
            .get(key)
            .ok_or_else(|| CoordinatorError::CatalogError(format!("no open ACID transaction for {key}")))?;
        metastore.alter_transactional_table(&a.target, txn.id(), write_id)
    } else {
        metastore.replace_table(&a.target)
    };
    match applied {
        Ok(()) => {}
        // Prepare observed the table, but apply found it gone: an external
        // actor dropped it between prepare and apply.
        Err(CoordinatorError::TableNotFound(_)) => {
            return Err(CoordinatorError::TransactionConflict {
                key: key.to_string(),
                reason: "table was dropped concurrently before apply".to_string(),
            });
        }
        Err(e) => return Err(e),
    }

    if !config.skip_deletion_for_alter && old_loc.as_deref() != target_loc.as_deref() {
        if let Some(old_loc) = old_loc {
            undo.push_finish(UndoTask::DeleteOnFinish { path: old_loc, recursive: true });
        }
    }

    let refreshed = fetch_table_statistics_or_empty(metastore.as_ref(), key);
    metastore.update_table_statistics(key, &refreshed, false)?;

    Ok(())
}

fn sibling_temp_path(target_loc: &str, table_name: &str, query_id: &str) -> String {
    match target_loc.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => format!("{parent}/_temp_{table_name}_{query_id}"),
        _ => format!("_temp_{table_name}_{query_id}"),
    }
}

fn stage_and_move_root(intents: &IntentRegistry, table: &TableKey) -> Option<String> {
    intents
        .iter()
        .find(|i| &i.target_table == table && i.mode == WriteMode::StageAndMove)
        .map(|i| i.staging_root.clone())
}

#[allow(clippy::too_many_arguments)]
fn apply_add_partitions(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    intents: &IntentRegistry,
    undo: &mut UndoStacks,
    created: &mut CreatedRows,
    table: &TableKey,
    partitions: &[Partition],
) -> Result<()> {
    let partition_columns = metastore.get_table(table)?.map(|t| t.partition_columns).unwrap_or_default();
    let staged_root = stage_and_move_root(intents, table);

    for chunk in partitions.chunks(config.partition_commit_batch_size.max(1)) {
        for p in chunk {
            let Some(target) = &p.storage.location else { continue };
            if filesystem.exists(target).map_err(fs_err)? {
                continue;
            }
            let staged = staged_root
                .as_ref()
                .map(|root| format!("{root}/{}", p.values.to_partition_name(&partition_columns)));
            match &staged {
                Some(staged) if staged != target && filesystem.exists(staged).map_err(fs_err)? => {
                    rename_directory(filesystem.as_ref(), staged, target)?;
                }
                _ => filesystem.mkdirs(target).map_err(fs_err)?,
            }
            undo.push_abort(UndoTask::CleanupOnAbort {
                path: target.clone(),
                query_id: None,
                delete_empty_directories: config.delete_empty_directories,
            });
        }

        metastore.add_partitions(table, chunk)?;
        for p in chunk {
            created.partitions.push((table.clone(), p.values.clone()));
        }
    }
    Ok(())
}

async fn apply_table_insert_existing(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    intents: &IntentRegistry,
    undo: &mut UndoStacks,
    key: &TableKey,
    ie: &InsertExistingAction,
) -> Result<()> {
    let target = metastore
        .get_table(key)?
        .and_then(|t| t.storage.location)
        .ok_or_else(|| CoordinatorError::TableNotFound(key.clone()))?;
    if let Some(staging_root) = stage_and_move_root(intents, key) {
        rename_staged_files(filesystem, config, undo, &staging_root, &target, &ie.file_names).await?;
    }

    let existing = fetch_table_statistics_or_empty(metastore.as_ref(), key);
    let merged = merge_insert_existing(existing, &ie.statistics_update, ie.merge);
    metastore.update_table_statistics(key, &merged, false)?;
    Ok(())
}

async fn apply_partition_insert_existing(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    filesystem: &Arc<dyn FilesystemDriver>,
    intents: &IntentRegistry,
    undo: &mut UndoStacks,
    key: &PartitionKey,
    ie: &InsertExistingAction,
) -> Result<()> {
    let target = metastore
        .get_partition(&key.table, &key.values)?
        .and_then(|p| p.storage.location)
        .ok_or_else(|| CoordinatorError::PartitionNotFound {
            table: key.table.clone(),
            values: key.values.clone(),
        })?;
    if let Some(staging_root) = stage_and_move_root(intents, &key.table) {
        rename_staged_files(filesystem, config, undo, &staging_root, &target, &ie.file_names).await?;
    }

    let existing = fetch_partition_statistics_or_empty(metastore.as_ref(), &key.table, &key.values);
    let merged = merge_insert_existing(existing, &ie.statistics_update, ie.merge);
    metastore.update_partition_statistics(&key.table, &key.values, &merged, false)?;
    Ok(())
}

fn apply_table_row_mutation(
    config: &CoordinatorConfig,
    metastore: &Arc<dyn Metastore>,
    acid_txns: &HashMap<TableKey, AcidTransaction>,
    undo: &mut UndoStacks,
    key: &TableKey,
    kind: ActionKind,
    r: &RowMutationAction,
) -> Result<()> {
    let txn = acid_txns
        .get(key)
        .ok_or_else(|| CoordinatorError::CatalogError(format!("no open ACID transaction for {key}")))?;
    txn.allocate_write_id(key)?;

    for delta in &r.deltas {
        undo.push_abort(UndoTask::CleanupOnAbort {
            path: delta.delta_dir.clone(),
            query_id: None,
            delete_empty_directories: config.delete_empty_directories,
        });
    }

    let adjustment = row_delta_adjustment(kind, &r.deltas);
    let existing = fetch_table_statistics_or_empty(metastore.as_ref(), key);
    let updated = apply_row_adjustment(existing, adjustment);
    metastore.update_table_statistics(key, &updated, false)?;

    // Only DELETE_ROWS carries enough information to attribute rows to a
    // specific partition; an UPDATE's deltas describe files layered on top
    // of the existing rows, not a row-count change at the partition level.
    if kind == ActionKind::DeleteRows {
        for delta in &r.deltas {
            if let Some(values) = &delta.partition_values {
                let existing = fetch_partition_statistics_or_empty(metastore.as_ref(), key, values);
                let updated = apply_row_adjustment(existing, -(delta.rows as i64));
                metastore.update_partition_statistics(key, values, &updated, false)?;
            }
        }
    }
    Ok(())
}

async fn rename_staged_files(
    filesystem: &Arc<dyn FilesystemDriver>,
    config: &CoordinatorConfig,
    undo: &mut UndoStacks,
    staging_root: &str,
    target_location: &str,
    file_names: &[String],
) -> Result<()> {
    if file_names.is_empty() {
        return Ok(());
    }
    let mut batch = AsyncRenameBatch::new(config.max_concurrent_filesystem_operations);
    for file in file_names {
        let src = format!("{staging_root}/{file}");
        let dst = format!("{target_location}/{file}");
        batch.schedule(filesystem.clone(), src, dst);
    }
    let (completed, error) = batch.wait_all().await;
    for (src, dst) in completed {
        undo.push_abort(UndoTask::RenameBackOnAbort { current: dst, original: src });
    }
    if let Some(e) = error {
        return Err(e);
    }
    Ok(())
}

/// Run every buffered `DROP`/`DROP_PRESERVE_DATA`, once every reversible
/// phase above has succeeded. These cannot be undone, so a failure here is
/// collected rather than rolled back; only if every attempted drop failed
/// is the failure reported as a pure drop failure (§4.5).
fn run_irreversible_phase(metastore: &Arc<dyn Metastore>, action_log: &ActionLog, undo: &mut UndoStacks) -> Result<()> {
    let mut attempted = 0usize;
    let mut errors = Vec::new();

    for (key, action) in action_log.iter_table_actions() {
        if let Action::Drop(d) = action {
            attempted += 1;
            if let Err(e) = drop_one_table(metastore, undo, key) {
                tracing::warn!(target: "stc::engine", table = %key, description = %d.description, error = %e, "irreversible table drop failed");
                errors.push(e);
            }
        }
    }
    for (key, action) in action_log.iter_partition_actions() {
        let delete_data = match action {
            Action::Drop(_) => true,
            Action::DropPreserveData(_) => false,
            _ => continue,
        };
        attempted += 1;
        if let Err(e) = drop_one_partition(metastore, undo, key, delete_data) {
            tracing::warn!(target: "stc::engine", table = %key.table, values = ?key.values, error = %e, "irreversible partition drop failed");
            errors.push(e);
        }
    }

    if attempted > 0 && errors.len() == attempted {
        return Err(stc_storage::aggregate_errors("irreversible drop phase", errors).expect("errors is non-empty"));
    }
    Ok(())
}

fn drop_one_table(metastore: &Arc<dyn Metastore>, undo: &mut UndoStacks, key: &TableKey) -> Result<()> {
    let existing = metastore.get_table(key)?;
    metastore.drop_table(key, false)?;
    if let Some(loc) = existing.and_then(|t| t.storage.location) {
        undo.push_finish(UndoTask::DeleteOnFinish { path: loc, recursive: true });
    }
    Ok(())
}

fn drop_one_partition(metastore: &Arc<dyn Metastore>, undo: &mut UndoStacks, key: &PartitionKey, delete_data: bool) -> Result<()> {
    let existing = metastore.get_partition(&key.table, &key.values)?;
    metastore.drop_partition(&key.table, &key.values, delete_data)?;
    if delete_data {
        if let Some(loc) = existing.and_then(|p| p.storage.location) {
            undo.push_finish(UndoTask::DeleteOnFinish { path: loc, recursive: true });
        }
    }
    Ok(())
}

/// Best-effort undo of catalog rows a failed commit already created
/// (§4.5, §9): partitions first, then tables, mirroring the order in which
/// the reversible phases added them.
fn undo_created_rows(metastore: &dyn Metastore, created: &CreatedRows) {
    for (table, values) in created.partitions.iter().rev() {
        if let Err(e) = metastore.drop_partition(table, values, false) {
            tracing::warn!(target: "stc::engine", table = %table, values = ?values, error = %e, "undo of a created partition failed");
        }
    }
    for key in created.tables.iter().rev() {
        if let Err(e) = metastore.drop_table(key, false) {
            tracing::warn!(target: "stc::engine", table = %key, error = %e, "undo of a created table failed");
        }
    }
}
