//! The coordinator's error taxonomy (§7).

use thiserror::Error;

use crate::model::TableKey;
use crate::types::{PartitionValues, QueryId};

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// All errors the coordinator can raise.
///
/// During commit prepare/apply, a failure triggers the undo sequence of
/// §4.5; any errors *that undo itself* raises are attached via
/// [`CoordinatorError::with_suppressed`] rather than replacing the original
/// error, so the caller sees the first real failure with the undo narrative
/// alongside it.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// §4.1 action-log transition violation.
    #[error("conflicting action on {key}: cannot apply {new_kind:?} after {prior_kind:?}")]
    ConflictingAction {
        /// The key (rendered) the conflict occurred on.
        key: String,
        /// The action already buffered.
        prior_kind: crate::action::ActionKind,
        /// The action that was rejected.
        new_kind: crate::action::ActionKind,
    },

    /// A transition that the table below does not name `ok`/`exists` for.
    #[error("unsupported action sequence on {key}: {prior_kind:?} then {new_kind:?}")]
    UnsupportedSequence {
        /// The key (rendered) the conflict occurred on.
        key: String,
        /// The action already buffered.
        prior_kind: crate::action::ActionKind,
        /// The action that was rejected.
        new_kind: crate::action::ActionKind,
    },

    /// A second action on the same key came from a different principal.
    #[error("action on {key} submitted by a different identity than the pending action")]
    DifferentIdentity {
        /// The key (rendered) the conflict occurred on.
        key: String,
    },

    /// `ADD` on a table key that already has a (non-dropped) action or
    /// already exists in the catalog.
    #[error("table {0} already exists")]
    TableAlreadyExists(TableKey),

    /// `ADD` on a partition key that already has a (non-dropped) action.
    #[error("partition {table}/{values:?} already exists")]
    PartitionAlreadyExists {
        /// Owning table.
        table: TableKey,
        /// Partition values.
        values: PartitionValues,
    },

    /// Read or alter referenced a table absent from both the log and the
    /// catalog.
    #[error("table {0} not found")]
    TableNotFound(TableKey),

    /// Read or alter referenced a partition absent from both the log and
    /// the catalog.
    #[error("partition {table}/{values:?} not found")]
    PartitionNotFound {
        /// Owning table.
        table: TableKey,
        /// Partition values.
        values: PartitionValues,
    },

    /// The catalog changed under us between prepare and apply.
    #[error("transaction conflict on {key}: {reason}")]
    TransactionConflict {
        /// The key (rendered) affected.
        key: String,
        /// What changed.
        reason: String,
    },

    /// A read or administrative op was attempted in the wrong lifecycle state.
    #[error("unsupported operation for current coordinator state: {0}")]
    UnsupportedMix(String),

    /// `get_all_tables` called while the action log has pending DDL in that schema.
    #[error("cannot list tables in schema {0} while DDL actions are pending")]
    UnsupportedWithPendingDdl(String),

    /// `DIRECT_TO_EXISTING` declared against a table with pending partition actions.
    #[error("direct write to {0} conflicts with pending partition actions on that table")]
    UnsupportedDirectWrite(TableKey),

    /// `drop_intent` referenced an id never declared (or already dropped).
    #[error("unknown intent declaration id {0}")]
    UnknownDeclaration(u64),

    /// A rename's target directory already existed.
    #[error("path already exists: {0}")]
    PathAlreadyExists(String),

    /// An I/O failure from the filesystem driver.
    #[error("filesystem error: {0}")]
    FilesystemError(String),

    /// The filesystem driver's transport was closed mid-operation.
    #[error("filesystem closed: {0}")]
    FilesystemClosed(String),

    /// An RPC failure from the catalog not otherwise classified.
    #[error("catalog error: {0}")]
    CatalogError(String),

    /// Repeated `commit`/`rollback` after the coordinator already finished.
    #[error("transaction already finished")]
    AlreadyFinished,

    /// Every op in a batch failed and the batch is reported as a whole.
    #[error("{context}: all {count} operations failed")]
    Aggregate {
        /// What phase produced this aggregate.
        context: String,
        /// Number of operations attempted.
        count: usize,
        /// Component error messages, capped.
        causes: Vec<String>,
    },

    /// A bounded task pool propagated a join/cancellation failure.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// Maximum number of suppressed undo-error messages attached to a primary
/// error (§9 "shared suppression during undo").
pub const MAX_SUPPRESSED_ERRORS: usize = 5;

impl CoordinatorError {
    /// Attach undo-phase errors to a primary commit/rollback failure,
    /// capping the attached list at [`MAX_SUPPRESSED_ERRORS`] so a
    /// pathological failure cascade cannot grow this unboundedly.
    pub fn with_suppressed(self, mut suppressed: Vec<CoordinatorError>) -> CoordinatorError {
        if suppressed.is_empty() {
            return self;
        }
        suppressed.truncate(MAX_SUPPRESSED_ERRORS);
        let causes = suppressed.into_iter().map(|e| e.to_string()).collect();
        CoordinatorError::Aggregate {
            context: format!("commit failed ({self}); undo raised further errors"),
            count: 1,
            causes,
        }
    }

    /// Whether this error plausibly clears on retry (catalog RPC noise).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::CatalogError(_) | CoordinatorError::FilesystemError(_)
        )
    }
}
