// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::CallTreeError;
use crate::FxIndexSet;
use parking_lot::RwLock;

/// Identifies a registered action name.
///
/// Codes are assigned sequentially in registration order and are never
/// recycled. The exact representation is not a public detail; it is
/// `#[repr(transparent)]` so the size is known for embedding in nodes.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionCode(u32);

impl ActionCode {
    /// Sentinel for "no action". Only the tree root carries it.
    pub const NO_ACTION: ActionCode = ActionCode(u32::MAX);

    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// Converts a registry offset into a code.
    ///
    /// # Panics
    /// Panics if the offset collides with the sentinel, which would require
    /// registering more than `u32::MAX - 1` action names.
    pub(crate) fn from_offset(offset: usize) -> Self {
        match u32::try_from(offset) {
            Ok(raw) if raw != u32::MAX => Self(raw),
            _ => panic!("action code offset {offset} exceeds the representable range"),
        }
    }

    /// The registry offset for this code, or `None` for the sentinel.
    pub(crate) fn to_offset(self) -> Option<usize> {
        if self == Self::NO_ACTION {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

/// Registry interning action names to [`ActionCode`]s.
///
/// Registration is idempotent: defining the same name twice returns the
/// same code. The registry only grows, so a code, once handed out, stays
/// valid for the life of the registry. Registration takes the write lock;
/// code-to-name lookup is safe for concurrent readers.
#[derive(Default)]
pub struct ActionSet {
    names: RwLock<FxIndexSet<String>>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` if unseen and returns its code.
    pub fn define_new_action(&self, name: &str) -> ActionCode {
        let mut names = self.names.write();
        if let Some(offset) = names.get_index_of(name) {
            return ActionCode::from_offset(offset);
        }
        let (offset, _) = names.insert_full(name.to_owned());
        ActionCode::from_offset(offset)
    }

    /// True iff `code` is the [`ActionCode::NO_ACTION`] sentinel or refers
    /// to a registered name.
    pub fn code_is_valid(&self, code: ActionCode) -> bool {
        match code.to_offset() {
            None => true,
            Some(offset) => offset < self.names.read().len(),
        }
    }

    /// Resolves a code back to its name.
    ///
    /// Fails with [`CallTreeError::InvalidActionCode`] for unregistered
    /// codes and for the sentinel, which has no name.
    pub fn get_action_name(&self, code: ActionCode) -> Result<String, CallTreeError> {
        let names = self.names.read();
        code.to_offset()
            .and_then(|offset| names.get_index(offset))
            .cloned()
            .ok_or(CallTreeError::InvalidActionCode(code))
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let actions = ActionSet::new();
        let read = actions.define_new_action("read");
        let parse = actions.define_new_action("parse");
        assert_ne!(read, parse);
        assert_eq!(read, actions.define_new_action("read"));
        assert_eq!(parse, actions.define_new_action("parse"));
        assert_eq!(2, actions.len());
    }

    #[test]
    fn codes_are_sequential_in_registration_order() {
        let actions = ActionSet::new();
        for (offset, name) in ["a", "b", "c"].iter().enumerate() {
            let code = actions.define_new_action(name);
            assert_eq!(offset as u32, code.to_raw());
        }
    }

    #[test]
    fn name_round_trips_through_its_code() {
        let actions = ActionSet::new();
        let code = actions.define_new_action("compress");
        assert_eq!("compress", actions.get_action_name(code).unwrap());
    }

    #[test]
    fn validity_covers_registered_range_and_sentinel() {
        let actions = ActionSet::new();
        let a = actions.define_new_action("a");
        let b = actions.define_new_action("b");
        assert!(actions.code_is_valid(a));
        assert!(actions.code_is_valid(b));
        assert!(actions.code_is_valid(ActionCode::NO_ACTION));
        assert!(!actions.code_is_valid(ActionCode(2)));
        assert!(!actions.code_is_valid(ActionCode(1000)));
    }

    #[test]
    fn sentinel_has_no_name() {
        let actions = ActionSet::new();
        assert_eq!(
            Err(CallTreeError::InvalidActionCode(ActionCode::NO_ACTION)),
            actions.get_action_name(ActionCode::NO_ACTION)
        );
    }

    #[test]
    fn unregistered_code_has_no_name() {
        let actions = ActionSet::new();
        actions.define_new_action("only");
        let bogus = ActionCode(7);
        assert_eq!(
            Err(CallTreeError::InvalidActionCode(bogus)),
            actions.get_action_name(bogus)
        );
    }
}
