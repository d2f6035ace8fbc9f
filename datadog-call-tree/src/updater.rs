// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::actions::ActionCode;
use crate::call_tree::NodeId;
use crate::clock::Clock;
use crate::concurrent::ConcurrentCallTree;
use crate::error::CallTreeError;
use std::sync::Arc;
use tracing::error;

/// Child-reuse policy for [`CallTreeUpdater::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterMode {
    /// Every entry creates a new child node, preserving per-call history.
    Distinct,
    /// Repeated entries at the same path update one shared child node;
    /// timings from the most recent invocation win.
    Merge,
}

/// Per-thread builder of call-tree branches.
///
/// Holds a cursor into the shared tree: the node of the innermost
/// currently-open action, the root when idle. [`CallTreeUpdater::enter`]
/// pushes the cursor down a link (creating or reusing it),
/// [`CallTreeUpdater::exit`] stamps the stop tick and pops back to the
/// parent. The cursor and parent stack are thread-private; only the tree
/// mutations themselves take the shared tree's lock.
///
/// Entries deeper than `max_depth` (when set) are counted but not
/// recorded, so deep recursion can be cut off without unbalancing the
/// enter/exit accounting.
pub struct CallTreeUpdater {
    tree: Arc<ConcurrentCallTree>,
    clock: Arc<dyn Clock>,
    cursor: NodeId,
    /// Parent of each open action, in open order. Nesting depth of the
    /// recorded trace equals this stack's length.
    parents: Vec<NodeId>,
    /// Intended nesting depth, including entries beyond `max_depth`.
    trace_depth: usize,
    max_depth: Option<usize>,
}

impl CallTreeUpdater {
    pub fn new(tree: Arc<ConcurrentCallTree>, clock: Arc<dyn Clock>) -> Self {
        Self::with_max_depth(tree, clock, None)
    }

    /// An updater that records at most `max_depth` nested levels.
    pub fn with_max_depth(
        tree: Arc<ConcurrentCallTree>,
        clock: Arc<dyn Clock>,
        max_depth: Option<usize>,
    ) -> Self {
        let cursor = tree.lock().root();
        Self {
            tree,
            clock,
            cursor,
            parents: Vec::new(),
            trace_depth: 0,
            max_depth,
        }
    }

    pub fn tree(&self) -> &Arc<ConcurrentCallTree> {
        &self.tree
    }

    /// Node of the innermost open action; the root when idle.
    pub fn current_node(&self) -> NodeId {
        self.cursor
    }

    /// Recorded nesting depth.
    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Intended nesting depth, which exceeds [`CallTreeUpdater::depth`]
    /// when entries were cut off by `max_depth`.
    pub fn trace_depth(&self) -> usize {
        self.trace_depth
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Changes the recording depth limit.
    ///
    /// Fails with [`CallTreeError::DepthChangeWithOpenActions`] while any
    /// action is open; changing the limit mid-trace would unbalance the
    /// enter/exit accounting.
    pub fn set_max_depth(&mut self, max_depth: Option<usize>) -> Result<(), CallTreeError> {
        if self.trace_depth != 0 {
            return Err(CallTreeError::DepthChangeWithOpenActions);
        }
        self.max_depth = max_depth;
        Ok(())
    }

    /// Opens `action_code` under the cursor and moves the cursor to it.
    ///
    /// In [`EnterMode::Merge`] the newest existing child with this code is
    /// reused and its start tick overwritten; otherwise (or when no such
    /// child exists) a new child is created. The lookup, creation and
    /// start-tick write happen under one lock acquisition, so no snapshot
    /// can observe a half-initialized node.
    ///
    /// Fails with [`CallTreeError::InvalidActionCode`] before touching the
    /// tree; the cursor is left unchanged.
    pub fn enter(&mut self, action_code: ActionCode, mode: EnterMode) -> Result<(), CallTreeError> {
        // The sentinel passes code_is_valid but names no action; it must
        // never reach a non-root node.
        if action_code == ActionCode::NO_ACTION || !self.tree.actions().code_is_valid(action_code)
        {
            return Err(CallTreeError::InvalidActionCode(action_code));
        }

        self.trace_depth += 1;
        if let Some(max_depth) = self.max_depth {
            if self.trace_depth > max_depth {
                return Ok(());
            }
        }

        let now = self.clock.now();
        let result = {
            let mut tree = self.tree.lock();
            let found = match mode {
                EnterMode::Merge => tree.find_link(self.cursor, action_code),
                EnterMode::Distinct => None,
            };
            match found {
                Some(node) => Ok(node),
                None => tree.add_new_link(self.cursor, action_code),
            }
            .map(|next| {
                tree.set_node_start_time(next, now);
                next
            })
        };

        match result {
            Ok(next) => {
                self.parents.push(self.cursor);
                self.cursor = next;
                Ok(())
            }
            Err(err) => {
                self.trace_depth -= 1;
                Err(err)
            }
        }
    }

    /// Closes the innermost open action: stamps its stop tick and pops the
    /// cursor back to the parent.
    ///
    /// Fails with [`CallTreeError::UnbalancedScope`] when no action is
    /// open.
    pub fn exit(&mut self) -> Result<(), CallTreeError> {
        self.exit_inner(None)
    }

    /// Like [`CallTreeUpdater::exit`], but verifies that the innermost
    /// open action is `action_code`, failing with
    /// [`CallTreeError::WrongAction`] (and leaving the cursor in place)
    /// on a mismatch.
    pub fn exit_action(&mut self, action_code: ActionCode) -> Result<(), CallTreeError> {
        self.exit_inner(Some(action_code))
    }

    fn exit_inner(&mut self, closing: Option<ActionCode>) -> Result<(), CallTreeError> {
        if self.trace_depth == 0 {
            return Err(CallTreeError::UnbalancedScope);
        }
        if let Some(max_depth) = self.max_depth {
            if self.trace_depth > max_depth {
                self.trace_depth -= 1;
                return Ok(());
            }
        }
        let Some(&parent) = self.parents.last() else {
            return Err(CallTreeError::UnbalancedScope);
        };

        let now = self.clock.now();
        {
            let mut tree = self.tree.lock();
            if let Some(found) = closing {
                let expected = tree.node_action_code(self.cursor);
                if expected != found {
                    return Err(CallTreeError::WrongAction { expected, found });
                }
            }
            tree.set_node_stop_time(self.cursor, now);
        }

        self.parents.pop();
        self.cursor = parent;
        self.trace_depth -= 1;
        Ok(())
    }
}

impl Drop for CallTreeUpdater {
    /// A thread going away with open actions is a caller bug; report it
    /// instead of silently dropping the unbalanced state.
    fn drop(&mut self) {
        if self.trace_depth == 0 {
            return;
        }
        let untracked = self.trace_depth - self.parents.len();
        let actions = Arc::clone(self.tree.actions());
        let open_actions = {
            let tree = self.tree.lock();
            let mut open = Vec::with_capacity(self.parents.len());
            for &node in std::iter::once(&self.cursor).chain(self.parents.iter().rev()) {
                let code = tree.node_action_code(node);
                if code == ActionCode::NO_ACTION {
                    break;
                }
                open.push(
                    actions
                        .get_action_name(code)
                        .unwrap_or_else(|_| format!("action#{}", code.to_raw())),
                );
            }
            open
        };
        error!(
            untracked,
            open_actions = ?open_actions,
            "call-tree updater dropped with open actions"
        );
    }
}
