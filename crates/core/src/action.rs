//! Pending mutations buffered in the Action Log (§4.1, §9 "Polymorphic actions").
//!
//! [`Action`] is generic over its target (`Table` or `Partition`) so table
//! actions and partition actions share one set of variants; the Action Log
//! keeps two separate maps (`Action<Table>` keyed by [`crate::TableKey`],
//! `Action<Partition>` keyed by [`crate::PartitionKey`]) and matches each
//! against its own transition table.

use crate::model::{Partition, Table};
use crate::statistics::Statistics;
use crate::types::{Identity, PartitionValues, QueryId};

/// Discriminant used to look up legal transitions without matching on the
/// full payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Create a new table or partition.
    Add,
    /// Drop and delete the underlying data.
    Drop,
    /// Drop but leave the underlying data in place.
    DropPreserveData,
    /// Replace the table/partition definition in place.
    Alter,
    /// Insert additional files into an already-existing location.
    InsertExisting,
    /// Row-level delete against an ACID table.
    DeleteRows,
    /// Row-level update against an ACID table.
    Update,
}

/// Fields common to every action: who submitted it and under which query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMeta {
    /// Caller identity; subsequent actions on the same key must match this.
    pub identity: Identity,
    /// Originating query id.
    pub query_id: QueryId,
}

/// Payload for an [`ActionKind::Add`] action.
#[derive(Debug, Clone, PartialEq)]
pub struct AddAction<T> {
    /// Common action fields.
    pub meta: ActionMeta,
    /// The table or partition being added.
    pub target: T,
    /// Accept any catalog row already present under this name as a
    /// successful no-op (`CREATE TABLE IF NOT EXISTS`) instead of failing
    /// with `TableAlreadyExists`/`PartitionAlreadyExists` at apply time.
    /// Bypasses the query-id/schema idempotent-retry check entirely (§4.5
    /// step 1).
    pub ignore_existing: bool,
}

/// Payload for an [`ActionKind::Alter`] action.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterAction<T> {
    /// Common action fields.
    pub meta: ActionMeta,
    /// The new table or partition definition.
    pub target: T,
}

/// Payload for [`ActionKind::Drop`] / [`ActionKind::DropPreserveData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropAction {
    /// Common action fields.
    pub meta: ActionMeta,
    /// Human-readable description used in error messages for the
    /// irreversible-phase aggregate error.
    pub description: String,
}

/// Payload for an [`ActionKind::InsertExisting`] action: files already
/// written into a staging location, to be renamed/scrubbed into place at
/// commit.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertExistingAction {
    /// Common action fields.
    pub meta: ActionMeta,
    /// Staged file names (bare names, no directory component).
    pub file_names: Vec<String>,
    /// Statistics contributed by this insert.
    pub statistics_update: Statistics,
    /// Whether the apply phase should merge these stats over the prior
    /// value (`true`) or replace it outright (`false`).
    pub merge: bool,
}

/// One partition's row-count delta within a [`RowMutationAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRowDelta {
    /// `None` for an unpartitioned table.
    pub partition_values: Option<PartitionValues>,
    /// Rows affected (always positive; the sign of the adjustment is
    /// implied by the action kind: negative for `DeleteRows`/`Update`).
    pub rows: u64,
    /// Delta directory holding the insert/delete records for this write-id.
    pub delta_dir: String,
    /// Statement id within a multi-statement `UPDATE`, if applicable.
    pub statement_id: Option<u64>,
}

/// Payload for [`ActionKind::DeleteRows`] / [`ActionKind::Update`]: requires
/// an active ACID transaction (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMutationAction {
    /// Common action fields.
    pub meta: ActionMeta,
    /// Per-partition (or single, for unpartitioned tables) row deltas.
    pub deltas: Vec<PartitionRowDelta>,
}

/// A pending mutation on a table or partition.
///
/// Generic over `T` (`Table` or `Partition`) so the same variant set serves
/// both the table-action log and the partition-action log; see module docs.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    /// §4.1 `ADD`.
    Add(AddAction<T>),
    /// §4.1 `DROP`.
    Drop(DropAction),
    /// §4.1 `DROP_PRESERVE_DATA` (partitions only).
    DropPreserveData(DropAction),
    /// §4.1 `ALTER`.
    Alter(AlterAction<T>),
    /// §4.1 `INSERT_EXISTING`.
    InsertExisting(InsertExistingAction),
    /// §4.1 `DELETE_ROWS` (tables only).
    DeleteRows(RowMutationAction),
    /// §4.1 `UPDATE` (tables only).
    Update(RowMutationAction),
}

impl<T> Action<T> {
    /// The action's kind, for transition-table lookups.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Add(_) => ActionKind::Add,
            Action::Drop(_) => ActionKind::Drop,
            Action::DropPreserveData(_) => ActionKind::DropPreserveData,
            Action::Alter(_) => ActionKind::Alter,
            Action::InsertExisting(_) => ActionKind::InsertExisting,
            Action::DeleteRows(_) => ActionKind::DeleteRows,
            Action::Update(_) => ActionKind::Update,
        }
    }

    /// The caller identity that submitted this action.
    pub fn identity(&self) -> &Identity {
        match self {
            Action::Add(a) => &a.meta.identity,
            Action::Drop(a) | Action::DropPreserveData(a) => &a.meta.identity,
            Action::Alter(a) => &a.meta.identity,
            Action::InsertExisting(a) => &a.meta.identity,
            Action::DeleteRows(a) | Action::Update(a) => &a.meta.identity,
        }
    }

    /// The query id that submitted this action.
    pub fn query_id(&self) -> &QueryId {
        match self {
            Action::Add(a) => &a.meta.query_id,
            Action::Drop(a) | Action::DropPreserveData(a) => &a.meta.query_id,
            Action::Alter(a) => &a.meta.query_id,
            Action::InsertExisting(a) => &a.meta.query_id,
            Action::DeleteRows(a) | Action::Update(a) => &a.meta.query_id,
        }
    }
}

/// A pending table mutation.
pub type TableAction = Action<Table>;
/// A pending partition mutation.
pub type PartitionAction = Action<Partition>;
