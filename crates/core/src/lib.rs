//! Shared types for the semi-transactional catalog/filesystem coordinator.
//!
//! This crate defines the domain model the rest of the workspace builds on:
//! - Identifiers: [`SchemaName`], [`TableKey`], [`PartitionKey`], [`QueryId`], [`Identity`]
//! - Catalog entities: [`Table`], [`Partition`], [`Statistics`]
//! - Pending mutations: [`Action`] and its per-kind payloads
//! - Write declarations: [`Intent`] and [`WriteMode`]
//! - The error taxonomy: [`CoordinatorError`]
//! - The external-collaborator traits: [`Metastore`], [`FilesystemDriver`], [`IdentityProvider`]
//! - [`CoordinatorConfig`]: the enumerated configuration surface

#![warn(missing_docs)]

pub mod action;
pub mod config;
pub mod error;
pub mod intent;
pub mod model;
pub mod statistics;
pub mod testing;
pub mod traits;
pub mod types;

pub use action::{
    Action, ActionKind, ActionMeta, AddAction, AlterAction, DropAction, InsertExistingAction,
    PartitionAction, PartitionRowDelta, RowMutationAction, TableAction,
};
pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, Result};
pub use intent::{DeclarationId, Intent, WriteMode};
pub use model::{Column, Partition, StorageDescriptor, Table, TableKey};
pub use statistics::{BasicStatistics, ColumnStatistics, Statistics};
pub use traits::{
    FilesystemDriver, FilesystemEntry, Grant, IdentityProvider, Metastore, StorageLocationOnly,
    WriteLockKind,
};
pub use types::{Identity, PartitionKey, PartitionValues, QueryId, SchemaName, TableName, TransactionId, WriteId};
