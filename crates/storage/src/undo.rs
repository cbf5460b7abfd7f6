//! LIFO undo/cleanup task stacks accumulated during prepare (§4.3, §4.5).
//!
//! The committer pushes one task per filesystem side effect as it performs
//! it. If prepare later fails, the abort stack runs back-to-front so that a
//! rename performed last is reversed first. If prepare succeeds, the finish
//! stack runs instead, for cleanup that is only safe once the commit is
//! certain (e.g. deleting a superseded table location).

use crate::delete::delete_recursive_scoped;
use crate::rename::rename_directory;
use stc_core::{CoordinatorError, FilesystemDriver};

/// One reversible or deferred filesystem side effect.
#[derive(Debug, Clone)]
pub enum UndoTask {
    /// Remove what a query's intent staged or wrote, scoped to `query_id`
    /// when given (`None` removes the whole `path`, used for a query's own
    /// staging root where scoping is unnecessary).
    CleanupOnAbort {
        path: String,
        query_id: Option<String>,
        delete_empty_directories: bool,
    },
    /// Reverse a directory rename that already completed.
    RenameBackOnAbort { current: String, original: String },
    /// Remove `path` only after the transaction has definitely finished
    /// (e.g. the old location of a table `ALTER` moved to a new location).
    DeleteOnFinish { path: String, recursive: bool },
}

/// Two LIFO stacks of [`UndoTask`]: one to run on abort, one on finish.
#[derive(Default)]
pub struct UndoStacks {
    abort: Vec<UndoTask>,
    finish: Vec<UndoTask>,
}

impl UndoStacks {
    /// An empty pair of stacks.
    pub fn new() -> Self {
        UndoStacks::default()
    }

    /// Record a task to run, in reverse order, if the transaction aborts.
    pub fn push_abort(&mut self, task: UndoTask) {
        self.abort.push(task);
    }

    /// Record a task to run, in reverse order, once the transaction has
    /// finished successfully.
    pub fn push_finish(&mut self, task: UndoTask) {
        self.finish.push(task);
    }

    /// Whether any abort-time task has been recorded.
    pub fn has_abort_tasks(&self) -> bool {
        !self.abort.is_empty()
    }

    /// Whether any finish-time task has been recorded.
    pub fn has_finish_tasks(&self) -> bool {
        !self.finish.is_empty()
    }

    /// Run every abort task, most recently pushed first. Every task runs
    /// regardless of earlier failures; all errors are returned together.
    pub fn run_abort(&mut self, fs: &dyn FilesystemDriver) -> Vec<CoordinatorError> {
        run_stack(&mut self.abort, fs)
    }

    /// Run every finish task, most recently pushed first, best-effort.
    pub fn run_finish(&mut self, fs: &dyn FilesystemDriver) -> Vec<CoordinatorError> {
        run_stack(&mut self.finish, fs)
    }
}

/// Fold a list of best-effort errors into one, per the suppressed-error
/// cap (§7); `None` if `errors` is empty.
pub fn aggregate_errors(context: &str, mut errors: Vec<CoordinatorError>) -> Option<CoordinatorError> {
    if errors.is_empty() {
        return None;
    }
    let first = errors.remove(0);
    if errors.is_empty() {
        Some(first)
    } else {
        Some(CoordinatorError::Aggregate {
            context: context.to_string(),
            count: errors.len() + 1,
            causes: vec![first.to_string()]
                .into_iter()
                .chain(errors.iter().map(|e| e.to_string()))
                .take(stc_core::MAX_SUPPRESSED_ERRORS)
                .collect(),
        })
    }
}

fn run_stack(stack: &mut Vec<UndoTask>, fs: &dyn FilesystemDriver) -> Vec<CoordinatorError> {
    let mut errors = Vec::new();
    while let Some(task) = stack.pop() {
        if let Err(e) = run_one(&task, fs) {
            errors.push(e);
        }
    }
    errors
}

fn run_one(task: &UndoTask, fs: &dyn FilesystemDriver) -> stc_core::Result<()> {
    match task {
        UndoTask::CleanupOnAbort { path, query_id, delete_empty_directories } => {
            delete_recursive_scoped(fs, path, query_id.as_deref(), *delete_empty_directories)
        }
        UndoTask::RenameBackOnAbort { current, original } => {
            if !fs
                .exists(current)
                .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?
            {
                return Ok(());
            }
            rename_directory(fs, current, original)
        }
        UndoTask::DeleteOnFinish { path, recursive } => {
            if fs
                .exists(path)
                .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?
            {
                fs.delete(path, *recursive)
                    .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?;
            }
            Ok(())
        }
    }
}
