//! The lifecycle state machine (C8): §4.8.

use stc_core::{CoordinatorError, Result};

/// The coordinator's lifecycle state.
///
/// `EMPTY → SHARED | EXCLUSIVE → FINISHED`. A transaction starts `Empty`;
/// the first read or shared (DML) submission moves it to `Shared`; the
/// first administrative op (grants, database DDL) moves it to `Exclusive`
/// and requires the prior state to have been `Empty`. `Finished` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No operation has been submitted yet.
    Empty,
    /// One or more shared (buffered DML / read) operations are in flight.
    Shared,
    /// An administrative operation holds exclusive access.
    Exclusive,
    /// `commit` or `rollback` has already run.
    Finished,
}

impl CoordinatorState {
    /// Move to `Shared` on a read or a buffered DML submission.
    ///
    /// Fails with [`CoordinatorError::UnsupportedMix`] if the coordinator is
    /// `Exclusive` (§3 invariant 4) or already `Finished`.
    pub fn enter_shared(&mut self) -> Result<()> {
        match self {
            CoordinatorState::Empty | CoordinatorState::Shared => {
                *self = CoordinatorState::Shared;
                Ok(())
            }
            CoordinatorState::Exclusive => Err(CoordinatorError::UnsupportedMix(
                "cannot submit a shared operation while the coordinator holds exclusive access".into(),
            )),
            CoordinatorState::Finished => Err(CoordinatorError::UnsupportedMix(
                "coordinator has already finished".into(),
            )),
        }
    }

    /// Move to `Exclusive` on an administrative operation.
    ///
    /// Requires the current state to be `Empty` (§4.8); any other state is
    /// [`CoordinatorError::UnsupportedMix`].
    pub fn enter_exclusive(&mut self) -> Result<()> {
        match self {
            CoordinatorState::Empty => {
                *self = CoordinatorState::Exclusive;
                Ok(())
            }
            CoordinatorState::Shared => Err(CoordinatorError::UnsupportedMix(
                "cannot submit an exclusive operation while shared operations are pending".into(),
            )),
            CoordinatorState::Exclusive => Err(CoordinatorError::UnsupportedMix(
                "coordinator already holds exclusive access".into(),
            )),
            CoordinatorState::Finished => Err(CoordinatorError::UnsupportedMix(
                "coordinator has already finished".into(),
            )),
        }
    }

    /// Whether a read is currently permitted (§4.2: only `Empty`/`Shared`).
    pub fn can_read(&self) -> bool {
        matches!(self, CoordinatorState::Empty | CoordinatorState::Shared)
    }

    /// Validate and transition to `Finished` for `commit`/`rollback`.
    ///
    /// Fails with [`CoordinatorError::AlreadyFinished`] if already
    /// `Finished`; `Empty` is accepted (a no-op commit/rollback).
    pub fn finish(&mut self) -> Result<()> {
        if *self == CoordinatorState::Finished {
            return Err(CoordinatorError::AlreadyFinished);
        }
        *self = CoordinatorState::Finished;
        Ok(())
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        CoordinatorState::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_requires_empty() {
        let mut s = CoordinatorState::Empty;
        s.enter_shared().unwrap();
        assert!(s.enter_exclusive().is_err());
    }

    #[test]
    fn shared_rejected_once_exclusive() {
        let mut s = CoordinatorState::Empty;
        s.enter_exclusive().unwrap();
        assert!(s.enter_shared().is_err());
    }

    #[test]
    fn repeated_finish_is_already_finished() {
        let mut s = CoordinatorState::Empty;
        s.finish().unwrap();
        assert!(matches!(s.finish(), Err(CoordinatorError::AlreadyFinished)));
    }

    #[test]
    fn read_blocked_while_exclusive() {
        let mut s = CoordinatorState::Empty;
        s.enter_exclusive().unwrap();
        assert!(!s.can_read());
    }
}
