//! The Action Log (C1): §4.1.

use std::collections::HashMap;

use stc_core::action::ActionKind;
use stc_core::{CoordinatorError, PartitionAction, PartitionKey, Result, TableAction, TableKey};

/// In-memory, per-transaction record of intended table and partition
/// mutations, keyed by identity.
///
/// Enforces the legality of action transitions (§4.1) and the "at most one
/// action per key, same identity throughout" invariants (§3).
#[derive(Default)]
pub struct ActionLog {
    table_actions: HashMap<TableKey, TableAction>,
    table_order: Vec<TableKey>,
    partition_actions: HashMap<PartitionKey, PartitionAction>,
    partition_order: Vec<PartitionKey>,
}

/// Whether a transition-table cell is legal, an idempotent-looking
/// re-add that the caller must see as "already exists", or a hard error.
enum Cell {
    Ok,
    AlreadyExists,
    Err,
}

fn table_cell(prior: ActionKind, new: ActionKind) -> Cell {
    use ActionKind::*;
    match (prior, new) {
        // §9 Open Question: ADD after DROP is specified here as
        // UnsupportedSequence, not as a recreate-and-succeed path.
        (Drop, Add) => Cell::Err,
        (Drop, Alter) => Cell::Ok, // "ok (recreate)"
        (Drop, _) => Cell::Err,
        (_, Add) => Cell::AlreadyExists,
        (_, _) => Cell::Err,
    }
}

fn partition_cell(prior: ActionKind, new: ActionKind) -> Cell {
    use ActionKind::*;
    match (prior, new) {
        (Drop, Alter) | (DropPreserveData, Alter) => Cell::Ok,
        // Only a prior ADD/ALTER/INSERT_EXISTING makes a re-ADD look like a
        // duplicate; a prior DROP(+D)/DROP_PRESERVE re-ADD is a plain error
        // (the partition transition table does not call this one "exists").
        (Add, Add) | (Alter, Add) | (InsertExisting, Add) => Cell::AlreadyExists,
        (_, _) => Cell::Err,
    }
}

const TABLE_KINDS: [ActionKind; 6] = [
    ActionKind::Add,
    ActionKind::Drop,
    ActionKind::Alter,
    ActionKind::InsertExisting,
    ActionKind::DeleteRows,
    ActionKind::Update,
];

const PARTITION_KINDS: [ActionKind; 5] = [
    ActionKind::Add,
    ActionKind::Drop,
    ActionKind::DropPreserveData,
    ActionKind::Alter,
    ActionKind::InsertExisting,
];

impl ActionLog {
    /// Construct an empty log.
    pub fn new() -> Self {
        ActionLog::default()
    }

    /// Insert a new table action or transition an existing one.
    ///
    /// Fails with [`CoordinatorError::ConflictingAction`]/
    /// [`CoordinatorError::UnsupportedSequence`] if the transition is not in
    /// the table-action transition table (§4.1), or
    /// [`CoordinatorError::DifferentIdentity`] if a prior action on `key`
    /// came from a different principal.
    pub fn put_table_action(&mut self, key: TableKey, action: TableAction) -> Result<()> {
        let new_kind = action.kind();
        if !TABLE_KINDS.contains(&new_kind) {
            return Err(CoordinatorError::UnsupportedSequence {
                key: key.to_string(),
                prior_kind: new_kind,
                new_kind,
            });
        }

        match self.table_actions.get(&key) {
            None => {
                self.table_order.push(key.clone());
                self.table_actions.insert(key, action);
                Ok(())
            }
            Some(prior) => {
                if prior.identity() != action.identity() {
                    return Err(CoordinatorError::DifferentIdentity { key: key.to_string() });
                }
                let prior_kind = prior.kind();
                match table_cell(prior_kind, new_kind) {
                    Cell::Ok => {
                        self.table_actions.insert(key, action);
                        Ok(())
                    }
                    Cell::AlreadyExists => Err(CoordinatorError::TableAlreadyExists(key)),
                    Cell::Err => Err(CoordinatorError::UnsupportedSequence {
                        key: key.to_string(),
                        prior_kind,
                        new_kind,
                    }),
                }
            }
        }
    }

    /// Insert a new partition action or transition an existing one; see
    /// [`ActionLog::put_table_action`] for the shared semantics.
    pub fn put_partition_action(&mut self, key: PartitionKey, action: PartitionAction) -> Result<()> {
        let new_kind = action.kind();
        if !PARTITION_KINDS.contains(&new_kind) {
            return Err(CoordinatorError::UnsupportedSequence {
                key: format!("{}/{:?}", key.table, key.values),
                prior_kind: new_kind,
                new_kind,
            });
        }

        match self.partition_actions.get(&key) {
            None => {
                self.partition_order.push(key.clone());
                self.partition_actions.insert(key, action);
                Ok(())
            }
            Some(prior) => {
                if prior.identity() != action.identity() {
                    return Err(CoordinatorError::DifferentIdentity {
                        key: format!("{}/{:?}", key.table, key.values),
                    });
                }
                let prior_kind = prior.kind();
                match partition_cell(prior_kind, new_kind) {
                    Cell::Ok => {
                        self.partition_actions.insert(key, action);
                        Ok(())
                    }
                    Cell::AlreadyExists => Err(CoordinatorError::PartitionAlreadyExists {
                        table: key.table,
                        values: key.values,
                    }),
                    Cell::Err => Err(CoordinatorError::UnsupportedSequence {
                        key: format!("{}/{:?}", key.table, key.values),
                        prior_kind,
                        new_kind,
                    }),
                }
            }
        }
    }

    /// The action currently buffered for `key`, if any.
    pub fn get_table_action(&self, key: &TableKey) -> Option<&TableAction> {
        self.table_actions.get(key)
    }

    /// The action currently buffered for `key`, if any.
    pub fn get_partition_action(&self, key: &PartitionKey) -> Option<&PartitionAction> {
        self.partition_actions.get(key)
    }

    /// All table actions, in submission order.
    pub fn iter_table_actions(&self) -> impl Iterator<Item = (&TableKey, &TableAction)> {
        self.table_order.iter().map(move |k| (k, &self.table_actions[k]))
    }

    /// All partition actions, in submission order.
    pub fn iter_partition_actions(&self) -> impl Iterator<Item = (&PartitionKey, &PartitionAction)> {
        self.partition_order
            .iter()
            .map(move |k| (k, &self.partition_actions[k]))
    }

    /// Partition actions buffered against `table`, in submission order.
    pub fn partition_actions_for_table(&self, table: &TableKey) -> impl Iterator<Item = (&PartitionKey, &PartitionAction)> {
        self.partition_order
            .iter()
            .filter(move |k| &k.table == table)
            .map(move |k| (k, &self.partition_actions[k]))
    }

    /// Whether any table action is buffered in `schema` (§4.2
    /// `get_all_tables` pending-DDL guard).
    pub fn has_table_actions_in_schema(&self, schema: &stc_core::SchemaName) -> bool {
        self.table_order.iter().any(|k| &k.schema_name == schema)
    }

    /// Whether the log has no buffered actions at all.
    pub fn is_empty(&self) -> bool {
        self.table_actions.is_empty() && self.partition_actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::action::{ActionMeta, AddAction, AlterAction, DropAction};
    use stc_core::{Identity, QueryId, StorageDescriptor, Table};

    fn meta() -> ActionMeta {
        ActionMeta {
            identity: Identity("alice".into()),
            query_id: QueryId("q1".into()),
        }
    }

    fn other_meta() -> ActionMeta {
        ActionMeta {
            identity: Identity("bob".into()),
            query_id: QueryId("q2".into()),
        }
    }

    fn table(key: TableKey) -> Table {
        Table {
            key,
            columns: vec![],
            partition_columns: vec![],
            storage: StorageDescriptor::at("/t"),
            owner: "alice".into(),
            parameters: Default::default(),
            write_id: None,
        }
    }

    #[test]
    fn add_then_add_is_already_exists() {
        let key = TableKey::new("db", "t");
        let mut log = ActionLog::new();
        log.put_table_action(
            key.clone(),
            TableAction::Add(AddAction {
                meta: meta(),
                target: table(key.clone()),
                ignore_existing: false,
            }),
        )
        .unwrap();

        let err = log
            .put_table_action(
                key.clone(),
                TableAction::Add(AddAction {
                    meta: meta(),
                    target: table(key.clone()),
                    ignore_existing: false,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::TableAlreadyExists(_)));
    }

    #[test]
    fn drop_then_add_is_unsupported_sequence() {
        let key = TableKey::new("db", "t");
        let mut log = ActionLog::new();
        log.put_table_action(
            key.clone(),
            TableAction::Drop(DropAction {
                meta: meta(),
                description: "drop db.t".into(),
            }),
        )
        .unwrap();

        let err = log
            .put_table_action(
                key.clone(),
                TableAction::Add(AddAction {
                    meta: meta(),
                    target: table(key.clone()),
                    ignore_existing: false,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnsupportedSequence { .. }));
    }

    #[test]
    fn drop_then_alter_recreates() {
        let key = TableKey::new("db", "t");
        let mut log = ActionLog::new();
        log.put_table_action(
            key.clone(),
            TableAction::Drop(DropAction {
                meta: meta(),
                description: "drop db.t".into(),
            }),
        )
        .unwrap();

        log.put_table_action(
            key.clone(),
            TableAction::Alter(AlterAction {
                meta: meta(),
                target: table(key.clone()),
            }),
        )
        .unwrap();

        assert!(matches!(log.get_table_action(&key), Some(TableAction::Alter(_))));
    }

    #[test]
    fn different_identity_is_rejected() {
        let key = TableKey::new("db", "t");
        let mut log = ActionLog::new();
        log.put_table_action(
            key.clone(),
            TableAction::Add(AddAction {
                meta: meta(),
                target: table(key.clone()),
                ignore_existing: false,
            }),
        )
        .unwrap();

        let err = log
            .put_table_action(
                key.clone(),
                TableAction::Alter(AlterAction {
                    meta: other_meta(),
                    target: table(key.clone()),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::DifferentIdentity { .. }));
    }

    #[test]
    fn insert_existing_rejected_as_partition_action() {
        // DELETE_ROWS/UPDATE are table-only kinds; submitting one against a
        // partition key must fail rather than silently succeed.
        use stc_core::action::RowMutationAction;
        use stc_core::PartitionValues;

        let key = PartitionKey::new(TableKey::new("db", "t"), PartitionValues::new(vec!["1".into()]));
        let mut log = ActionLog::new();
        let err = log
            .put_partition_action(
                key,
                PartitionAction::DeleteRows(RowMutationAction {
                    meta: meta(),
                    deltas: vec![],
                }),
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnsupportedSequence { .. }));
    }
}
