//! The embedded facade (spec §6): a thin session wrapper around
//! [`stc_engine::Coordinator`] adding the query-scoped conveniences external
//! callers are expected to drive — `begin_query`, `begin_insert`/
//! `begin_delete`/`begin_update`, and passthroughs for everything else.

pub mod session;

pub use session::Session;
