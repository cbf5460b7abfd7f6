//! The Filesystem Orchestrator (C3): §4.3.
//!
//! Stages directories, performs per-file renames with bounded concurrency,
//! and schedules the cleanup/undo tasks the committer accumulates during
//! prepare (§4.5).

pub mod async_rename;
pub mod delete;
pub mod rename;
pub mod undo;

pub use async_rename::{AsyncRenameBatch, CancellationFlag};
pub use delete::{delete_recursive_scoped, is_delta_directory_name, is_reserved_name};
pub use rename::rename_directory;
pub use undo::{aggregate_errors, UndoStacks, UndoTask};
