//! A semi-transactional coordinator bridging an external relational catalog
//! and an external object/file store, in the style of Hive Metastore's and
//! Trino's two-phase write coordinators.
//!
//! This crate is the workspace root facade: it re-exports the embedded
//! session API ([`stc_api::Session`]) plus the domain types callers build
//! requests out of. The coordinator itself never talks to a real catalog or
//! filesystem — those are injected collaborators (see [`stc_core::Metastore`]
//! and [`stc_core::FilesystemDriver`]); this crate owns only the in-memory
//! action log, the two-phase commit/abort machinery, the filesystem
//! orchestration, statistics accumulation, and the ACID-transaction
//! interlock.

pub use stc_api::Session;
pub use stc_core::{
    Action, ActionKind, BasicStatistics, Column, ColumnStatistics, CoordinatorConfig,
    CoordinatorError, DeclarationId, FilesystemDriver, FilesystemEntry, Grant, Identity,
    IdentityProvider, Intent, Metastore, Partition, PartitionKey, PartitionValues, QueryId,
    Result, SchemaName, Statistics, StorageDescriptor, Table, TableKey, TableName,
    TransactionId, WriteId, WriteLockKind, WriteMode,
};
pub use stc_engine::Coordinator;
