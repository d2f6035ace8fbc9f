// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::actions::ActionCode;

/// Errors raised by call-tree operations.
///
/// All of these are local, synchronous faults surfaced to the immediate
/// caller. The library never retries and never repairs tree structure:
/// an unbalanced scope is a caller bug, and patching the tree up would
/// corrupt every measurement that follows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallTreeError {
    /// The action code is outside the registry's valid range.
    #[error("invalid action code: {}", .0.to_raw())]
    InvalidActionCode(ActionCode),
    /// No stat is stored under the requested key.
    #[error("stat key not found: {0:?}")]
    KeyNotFound(String),
    /// A stat exists under the key, but holds a different variant.
    #[error("stat type mismatch for {key:?}: stored {stored}, requested {requested}")]
    TypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },
    /// An exit was requested while no action was open.
    #[error("unbalanced scope: exit with no open action")]
    UnbalancedScope,
    /// The depth limit was changed while actions were open.
    #[error("cannot change max depth while actions are open")]
    DepthChangeWithOpenActions,
    /// The action being closed is not the innermost open action.
    #[error(
        "closing wrong action: expected {}, found {}",
        .expected.to_raw(),
        .found.to_raw()
    )]
    WrongAction {
        /// The innermost open action, which should have been closed.
        expected: ActionCode,
        /// The action the caller tried to close.
        found: ActionCode,
    },
}
