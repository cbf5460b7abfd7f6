//! The Action Log (C1), the lifecycle state machine (C8), and the Intent
//! Registry (C7).
//!
//! None of the types here take their own lock: per spec §5, the coordinator
//! serializes access to all three under one mutex, so they are plain
//! `!Sync`-by-convention structures mutated through `&mut self`.

pub mod action_log;
pub mod intent_registry;
pub mod lifecycle;

pub use action_log::ActionLog;
pub use intent_registry::IntentRegistry;
pub use lifecycle::CoordinatorState;
