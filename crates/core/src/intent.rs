//! Write declarations tracked by the Intent Registry (§4.7).

use crate::model::TableKey;
use crate::types::{Identity, QueryId};

/// How a writer is placing files relative to a table's final location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum WriteMode {
    /// Stage in a sibling directory, then rename into place at commit.
    StageAndMove,
    /// Write directly into a new target directory.
    DirectToNew,
    /// Write directly into an existing directory, side-by-side with
    /// pre-existing data.
    DirectToExisting,
}

/// Monotonic identifier for a declared intent, unique within one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeclarationId(pub u64);

/// A caller's pre-declaration of a staging location and write mode.
///
/// Declared before any files are written so that rollback knows which
/// directories to scrub without scanning unrelated paths (§3, §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    /// Unique id for this declaration within the transaction.
    pub declaration_id: DeclarationId,
    /// Write mode.
    pub mode: WriteMode,
    /// Caller identity.
    pub identity: Identity,
    /// Originating query id.
    pub query_id: QueryId,
    /// Directory the writer is staging into (or writing directly into, for
    /// `DirectToNew`/`DirectToExisting`).
    pub staging_root: String,
    /// Table this intent targets.
    pub target_table: TableKey,
}
