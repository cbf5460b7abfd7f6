//! Background transaction heartbeat (§4.6 "Keeping a transaction alive").

use std::sync::Arc;
use std::time::Duration;

use stc_core::{Metastore, TransactionId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running heartbeat loop for one open ACID transaction.
///
/// Heartbeats at half the configured interval, so a single missed tick never
/// lets the catalog's own timeout arrive on the boundary. A single missed
/// heartbeat is logged and retried on the next tick rather than treated as
/// fatal — only the catalog's own timeout decides a transaction is dead.
pub struct HeartbeatHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Spawn a heartbeat loop for `txn_id`, ticking at `interval / 2`.
    pub fn spawn(metastore: Arc<dyn Metastore>, txn_id: TransactionId, interval: Duration) -> Self {
        let tick = (interval / 2).max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = metastore.send_transaction_heartbeat(txn_id) {
                            tracing::warn!(
                                target: "stc::durability",
                                txn_id = txn_id.0,
                                error = %e,
                                "transaction heartbeat failed; will retry",
                            );
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        HeartbeatHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.join).await;
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.join.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::testing::InMemoryMetastore;
    use stc_core::Metastore as _;

    #[tokio::test]
    async fn heartbeat_ticks_against_an_open_transaction() {
        let metastore: Arc<dyn Metastore> = Arc::new(InMemoryMetastore::default());
        let txn_id = metastore.open_transaction().unwrap();

        let handle = HeartbeatHandle::spawn(metastore.clone(), txn_id, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        // The transaction is still open (heartbeats never failed it).
        assert!(metastore.send_transaction_heartbeat(txn_id).is_ok());
    }

    #[tokio::test]
    async fn stop_is_idempotent_with_drop() {
        let metastore: Arc<dyn Metastore> = Arc::new(InMemoryMetastore::default());
        let txn_id = metastore.open_transaction().unwrap();
        let handle = HeartbeatHandle::spawn(metastore, txn_id, Duration::from_millis(20));
        drop(handle);
    }
}
