//! The Read View (C2): §4.2.
//!
//! Every read overlays the Action Log on top of the catalog: a pending
//! `ADD`/`ALTER` shadows the catalog row entirely, a pending `DROP`(`+D`)
//! hides it, and anything else falls through to the catalog. Partition
//! lookups that fall through are cached for the rest of the transaction,
//! bounded to `per_transaction_cache_max_size` entries, evicted oldest-first.

use std::collections::{HashMap, VecDeque};

use stc_concurrency::ActionLog;
use stc_core::{Action, Metastore, Partition, PartitionKey, PartitionValues, Result, Table, TableKey};

/// Per-transaction cache of catalog-sourced partition reads.
pub struct ReadView {
    max_size: usize,
    cache: HashMap<PartitionKey, Partition>,
    order: VecDeque<PartitionKey>,
}

impl ReadView {
    /// Build a view bounded to `max_size` cached partitions.
    pub fn new(max_size: usize) -> Self {
        ReadView {
            max_size: max_size.max(1),
            cache: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Resolve a table, overlaying any pending action on the catalog row.
    pub fn resolve_table(
        &self,
        action_log: &ActionLog,
        metastore: &dyn Metastore,
        key: &TableKey,
    ) -> Result<Option<Table>> {
        match action_log.get_table_action(key) {
            Some(Action::Add(a)) => Ok(Some(a.target.clone())),
            Some(Action::Alter(a)) => Ok(Some(a.target.clone())),
            Some(Action::Drop(_)) | Some(Action::DropPreserveData(_)) => Ok(None),
            Some(Action::InsertExisting(_)) | Some(Action::DeleteRows(_)) | Some(Action::Update(_)) | None => {
                metastore.get_table(key)
            }
        }
    }

    /// Resolve one partition, overlaying any pending action, and caching a
    /// catalog fallthrough for subsequent lookups within this transaction.
    pub fn resolve_partition(
        &mut self,
        action_log: &ActionLog,
        metastore: &dyn Metastore,
        table: &TableKey,
        values: &PartitionValues,
    ) -> Result<Option<Partition>> {
        let key = PartitionKey::new(table.clone(), values.clone());
        match action_log.get_partition_action(&key) {
            Some(Action::Add(a)) => return Ok(Some(a.target.clone())),
            Some(Action::Alter(a)) => return Ok(Some(a.target.clone())),
            Some(Action::Drop(_)) | Some(Action::DropPreserveData(_)) => return Ok(None),
            Some(Action::InsertExisting(_)) | None => {}
            Some(Action::DeleteRows(_)) | Some(Action::Update(_)) => {
                // Partition actions never produce these kinds (§4.1); fall
                // through to the catalog as if unbuffered.
            }
        }

        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached.clone()));
        }

        let fetched = metastore.get_partition(table, values)?;
        if let Some(p) = &fetched {
            self.insert_cache(key, p.clone());
        }
        Ok(fetched)
    }

    fn insert_cache(&mut self, key: PartitionKey, partition: Partition) {
        if !self.cache.contains_key(&key) && self.order.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
        if !self.cache.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.cache.insert(key, partition);
    }

    /// Number of partitions currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolve partition names matching `filter`, overlaying pending
    /// partition actions buffered against `table`: a pending `ADD`/`ALTER`
    /// adds its name if the catalog hasn't already listed it, a pending
    /// `DROP`/`DROP_PRESERVE_DATA` removes it.
    pub fn resolve_partition_names_by_filter(
        &self,
        action_log: &ActionLog,
        metastore: &dyn Metastore,
        table: &TableKey,
        filter: &str,
    ) -> Result<Vec<String>> {
        let partition_columns = metastore.get_table(table)?.map(|t| t.partition_columns).unwrap_or_default();
        let mut names = metastore.get_partition_names_by_filter(table, filter)?;

        for (key, action) in action_log.partition_actions_for_table(table) {
            match action {
                Action::Add(a) => {
                    let name = a.target.values.to_partition_name(&partition_columns);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                Action::Alter(a) => {
                    let name = a.target.values.to_partition_name(&partition_columns);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                Action::Drop(_) | Action::DropPreserveData(_) => {
                    let name = key.values.to_partition_name(&partition_columns);
                    names.retain(|n| n != &name);
                }
                Action::InsertExisting(_) | Action::DeleteRows(_) | Action::Update(_) => {}
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Resolve each of `names` to a partition, overlaying any pending action
    /// and the per-transaction cache the same way [`ReadView::resolve_partition`]
    /// does; names the catalog and the action log both agree are gone are
    /// silently dropped from the result.
    pub fn resolve_partitions_by_names(
        &mut self,
        action_log: &ActionLog,
        metastore: &dyn Metastore,
        table: &TableKey,
        names: &[String],
    ) -> Result<Vec<Partition>> {
        let partition_columns = metastore.get_table(table)?.map(|t| t.partition_columns).unwrap_or_default();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let values = parse_partition_name(name, &partition_columns);
            if let Some(partition) = self.resolve_partition(action_log, metastore, table, &values)? {
                out.push(partition);
            }
        }
        Ok(out)
    }
}

/// Reverse of [`PartitionValues::to_partition_name`]: split `"col=val/col=val"`
/// back into its raw values, in partition-column order.
fn parse_partition_name(name: &str, partition_columns: &[String]) -> PartitionValues {
    let mut by_column: HashMap<&str, String> = HashMap::new();
    for segment in name.split('/') {
        if let Some((col, val)) = segment.split_once('=') {
            by_column.insert(col, val.to_string());
        }
    }
    let values = partition_columns
        .iter()
        .map(|col| by_column.remove(col.as_str()).unwrap_or_default())
        .collect();
    PartitionValues::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::action::{AddAction, ActionMeta};
    use stc_core::testing::InMemoryMetastore;
    use stc_core::{Identity, PartitionAction, QueryId, StorageDescriptor};

    fn meta() -> ActionMeta {
        ActionMeta {
            identity: Identity("alice".into()),
            query_id: QueryId("q1".into()),
        }
    }

    fn partition(table: TableKey, values: Vec<&str>) -> Partition {
        Partition {
            table,
            values: PartitionValues::new(values.into_iter().map(String::from).collect()),
            storage: StorageDescriptor::at("/t/p"),
            parameters: Default::default(),
        }
    }

    #[test]
    fn pending_add_shadows_the_catalog() {
        let table = TableKey::new("db", "t");
        let metastore = InMemoryMetastore::default();
        let mut log = ActionLog::new();
        let values = PartitionValues::new(vec!["1".into()]);
        log.put_partition_action(
            PartitionKey::new(table.clone(), values.clone()),
            PartitionAction::Add(AddAction {
                meta: meta(),
                target: partition(table.clone(), vec!["1"]),
                ignore_existing: false,
            }),
        )
        .unwrap();

        let mut view = ReadView::new(10);
        let resolved = view.resolve_partition(&log, &metastore, &table, &values).unwrap();
        assert!(resolved.is_some());
    }

    #[test]
    fn catalog_fallthrough_is_cached() {
        let table = TableKey::new("db", "t");
        let metastore = InMemoryMetastore::default();
        let values = PartitionValues::new(vec!["1".into()]);
        metastore.seed_partition(partition(table.clone(), vec!["1"]));

        let log = ActionLog::new();
        let mut view = ReadView::new(10);
        view.resolve_partition(&log, &metastore, &table, &values).unwrap();
        assert_eq!(view.cached_len(), 1);
    }

    #[test]
    fn cache_evicts_oldest_past_the_bound() {
        let table = TableKey::new("db", "t");
        let metastore = InMemoryMetastore::default();
        for i in 0..3 {
            metastore.seed_partition(partition(table.clone(), vec![&i.to_string()]));
        }
        let log = ActionLog::new();
        let mut view = ReadView::new(2);
        for i in 0..3 {
            let values = PartitionValues::new(vec![i.to_string()]);
            view.resolve_partition(&log, &metastore, &table, &values).unwrap();
        }
        assert_eq!(view.cached_len(), 2);
    }

    fn table_with_partition_column(key: TableKey) -> stc_core::Table {
        stc_core::Table {
            key,
            columns: vec![],
            partition_columns: vec!["d".into()],
            storage: StorageDescriptor::at("/t"),
            owner: "alice".into(),
            parameters: Default::default(),
            write_id: None,
        }
    }

    #[test]
    fn names_by_filter_adds_pending_add_and_removes_pending_drop() {
        let table = TableKey::new("db", "t");
        let metastore = InMemoryMetastore::default();
        metastore.seed_table(table_with_partition_column(table.clone()));
        metastore.seed_partition(partition(table.clone(), vec!["1"]));
        metastore.seed_partition(partition(table.clone(), vec!["2"]));

        let mut log = ActionLog::new();
        log.put_partition_action(
            PartitionKey::new(table.clone(), PartitionValues::new(vec!["2".into()])),
            PartitionAction::Drop(stc_core::action::DropAction { meta: meta(), description: "drop d=2".into() }),
        )
        .unwrap();
        log.put_partition_action(
            PartitionKey::new(table.clone(), PartitionValues::new(vec!["3".into()])),
            PartitionAction::Add(AddAction {
                meta: meta(),
                target: partition(table.clone(), vec!["3"]),
                ignore_existing: false,
            }),
        )
        .unwrap();

        let view = ReadView::new(10);
        let names = view.resolve_partition_names_by_filter(&log, &metastore, &table, "").unwrap();
        assert_eq!(names, vec!["d=1".to_string(), "d=3".to_string()]);
    }

    #[test]
    fn partitions_by_names_overlays_pending_actions() {
        let table = TableKey::new("db", "t");
        let metastore = InMemoryMetastore::default();
        metastore.seed_table(table_with_partition_column(table.clone()));
        metastore.seed_partition(partition(table.clone(), vec!["1"]));

        let mut log = ActionLog::new();
        log.put_partition_action(
            PartitionKey::new(table.clone(), PartitionValues::new(vec!["1".into()])),
            PartitionAction::Drop(stc_core::action::DropAction { meta: meta(), description: "drop d=1".into() }),
        )
        .unwrap();

        let mut view = ReadView::new(10);
        let resolved = view
            .resolve_partitions_by_names(&log, &metastore, &table, &["d=1".to_string()])
            .unwrap();
        assert!(resolved.is_empty());
    }
}
