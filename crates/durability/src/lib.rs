//! The ACID Interlock (C6): §4.6.
//!
//! Sequences catalog transaction open/commit/abort, allocates write-ids for
//! transactional tables, keeps a transaction alive with a background
//! heartbeat while a query holds it open, and caches each table's valid
//! write-id snapshot for the lifetime of the transaction.

pub mod heartbeat;
pub mod transaction;

pub use heartbeat::HeartbeatHandle;
pub use transaction::AcidTransaction;
