//! Bounded, cancellable per-file renames (§4.3 "Async file rename", §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stc_core::{CoordinatorError, FilesystemDriver, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A flag shared between the committer and every in-flight rename task.
///
/// Flipping it does not interrupt a rename already running; it only stops
/// *further* renames from starting, per §5 "Cancellation and timeouts".
#[derive(Clone)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// A fresh, not-yet-cancelled flag.
    pub fn new() -> Self {
        CancellationFlag(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation to every holder of this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        CancellationFlag::new()
    }
}

/// Schedules per-file renames for one `INSERT_EXISTING` action across a
/// bounded pool, and waits for them as a group during prepare's wait phase.
pub struct AsyncRenameBatch {
    semaphore: Arc<Semaphore>,
    cancellation: CancellationFlag,
    handles: Vec<JoinHandle<Result<Option<(String, String)>>>>,
}

impl AsyncRenameBatch {
    /// Build a batch bounded to `max_concurrency` renames in flight at once.
    pub fn new(max_concurrency: usize) -> Self {
        AsyncRenameBatch {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cancellation: CancellationFlag::new(),
            handles: Vec::new(),
        }
    }

    /// The cancellation flag the committer flips on a failed commit.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Schedule one file's rename. Returns immediately; await the result via
    /// [`AsyncRenameBatch::wait_all`].
    ///
    /// If the cancellation flag is already set by the time a permit is
    /// acquired, the rename is skipped and reported as not performed (the
    /// committer's undo pass is then responsible for the source file, which
    /// was never touched).
    pub fn schedule(&mut self, fs: Arc<dyn FilesystemDriver>, src: String, dst: String) {
        let semaphore = self.semaphore.clone();
        let cancellation = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| CoordinatorError::TaskFailed(e.to_string()))?;
            if cancellation.is_cancelled() {
                tracing::debug!(target: "stc::storage", src = %src, dst = %dst, "rename skipped: cancelled");
                return Ok(None);
            }
            let (src2, dst2) = (src.clone(), dst.clone());
            let renamed = tokio::task::spawn_blocking(move || fs.rename(&src2, &dst2))
                .await
                .map_err(|e| CoordinatorError::TaskFailed(e.to_string()))?
                .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?;
            if !renamed {
                return Err(CoordinatorError::FilesystemError(format!(
                    "rename of {src} to {dst} was declined by the filesystem driver"
                )));
            }
            Ok(Some((src, dst)))
        });
        self.handles.push(handle);
    }

    /// Await every scheduled rename. Returns the first error encountered
    /// (after every task has finished, so no task is left dangling), and
    /// the list of renames that actually completed — the committer needs
    /// this list to know what to undo.
    pub async fn wait_all(&mut self) -> (Vec<(String, String)>, Option<CoordinatorError>) {
        let mut completed = Vec::new();
        let mut first_error = None;
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(Ok(Some(pair))) => completed.push(pair),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => first_error.get_or_insert(e),
                Err(e) => {
                    first_error.get_or_insert(CoordinatorError::TaskFailed(e.to_string()));
                }
            };
        }
        (completed, first_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::testing::InMemoryFilesystem;

    #[tokio::test]
    async fn renames_complete_and_report_success() {
        let concrete = InMemoryFilesystem::default();
        concrete.seed_file("/staging/a", 1);
        concrete.seed_file("/staging/b", 1);
        let fs: Arc<dyn FilesystemDriver> = Arc::new(concrete);

        let mut batch = AsyncRenameBatch::new(2);
        batch.schedule(fs.clone(), "/staging/a".into(), "/t/a".into());
        batch.schedule(fs.clone(), "/staging/b".into(), "/t/b".into());
        let (completed, err) = batch.wait_all().await;
        assert!(err.is_none());
        assert_eq!(completed.len(), 2);
        assert!(fs.exists("/t/a").unwrap());
        assert!(fs.exists("/t/b").unwrap());
    }

    #[tokio::test]
    async fn cancellation_skips_unstarted_renames() {
        let concrete = InMemoryFilesystem::default();
        concrete.seed_file("/staging/a", 1);
        let fs: Arc<dyn FilesystemDriver> = Arc::new(concrete);

        let mut batch = AsyncRenameBatch::new(1);
        batch.cancellation().cancel();
        batch.schedule(fs.clone(), "/staging/a".into(), "/t/a".into());
        let (completed, err) = batch.wait_all().await;
        assert!(err.is_none());
        assert!(completed.is_empty());
        assert!(fs.exists("/staging/a").unwrap());
    }
}
