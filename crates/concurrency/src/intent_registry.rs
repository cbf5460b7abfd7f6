//! The Intent Registry (C7): §4.7.

use std::collections::HashMap;

use stc_core::{CoordinatorError, DeclarationId, Identity, Intent, QueryId, Result, TableKey, WriteMode};

/// Tracks staging-root paths declared by writers so rollback can scrub them
/// without scanning unrelated directories.
#[derive(Default)]
pub struct IntentRegistry {
    intents: HashMap<DeclarationId, Intent>,
    order: Vec<DeclarationId>,
    next_id: u64,
}

impl IntentRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        IntentRegistry::default()
    }

    /// Declare an intent to write, returning its unique id.
    ///
    /// `table_has_pending_partition_actions` is the caller's answer to "does
    /// `target_table` already have buffered partition actions in the action
    /// log" — `DIRECT_TO_EXISTING` against such a table fails with
    /// [`CoordinatorError::UnsupportedDirectWrite`] (§9 Open Question: this
    /// is enforced on every submission path, not just some).
    pub fn declare_intent(
        &mut self,
        mode: WriteMode,
        identity: Identity,
        query_id: QueryId,
        staging_root: String,
        target_table: TableKey,
        table_has_pending_partition_actions: bool,
    ) -> Result<DeclarationId> {
        if mode == WriteMode::DirectToExisting && table_has_pending_partition_actions {
            return Err(CoordinatorError::UnsupportedDirectWrite(target_table));
        }
        if self.intents.values().any(|i| i.staging_root == staging_root) {
            return Err(CoordinatorError::PathAlreadyExists(staging_root));
        }

        self.next_id += 1;
        let declaration_id = DeclarationId(self.next_id);
        self.order.push(declaration_id);
        self.intents.insert(
            declaration_id,
            Intent {
                declaration_id,
                mode,
                identity,
                query_id,
                staging_root,
                target_table,
            },
        );
        Ok(declaration_id)
    }

    /// Remove an intent without any filesystem side effect.
    ///
    /// Fails with [`CoordinatorError::UnknownDeclaration`] if `id` was never
    /// declared or was already dropped.
    pub fn drop_intent(&mut self, id: DeclarationId) -> Result<()> {
        if self.intents.remove(&id).is_none() {
            return Err(CoordinatorError::UnknownDeclaration(id.0));
        }
        self.order.retain(|o| *o != id);
        Ok(())
    }

    /// All currently-declared intents, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Intent> {
        self.order.iter().map(move |id| &self.intents[id])
    }

    /// Whether the registry has no declared intents.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity("alice".into())
    }

    fn query_id() -> QueryId {
        QueryId("q1".into())
    }

    #[test]
    fn direct_to_existing_rejected_with_pending_partition_actions() {
        let mut reg = IntentRegistry::new();
        let err = reg
            .declare_intent(
                WriteMode::DirectToExisting,
                identity(),
                query_id(),
                "/t".into(),
                TableKey::new("db", "t"),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnsupportedDirectWrite(_)));
    }

    #[test]
    fn staging_roots_must_be_unique() {
        let mut reg = IntentRegistry::new();
        reg.declare_intent(
            WriteMode::StageAndMove,
            identity(),
            query_id(),
            "/t/_staging_q1".into(),
            TableKey::new("db", "t"),
            false,
        )
        .unwrap();

        let err = reg
            .declare_intent(
                WriteMode::StageAndMove,
                identity(),
                query_id(),
                "/t/_staging_q1".into(),
                TableKey::new("db", "t"),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::PathAlreadyExists(_)));
    }

    #[test]
    fn drop_unknown_declaration_fails() {
        let mut reg = IntentRegistry::new();
        assert!(matches!(
            reg.drop_intent(DeclarationId(42)),
            Err(CoordinatorError::UnknownDeclaration(42))
        ));
    }

    #[test]
    fn drop_then_iterate_is_empty() {
        let mut reg = IntentRegistry::new();
        let id = reg
            .declare_intent(
                WriteMode::DirectToNew,
                identity(),
                query_id(),
                "/t/new".into(),
                TableKey::new("db", "t"),
                false,
            )
            .unwrap();
        reg.drop_intent(id).unwrap();
        assert!(reg.is_empty());
    }
}
