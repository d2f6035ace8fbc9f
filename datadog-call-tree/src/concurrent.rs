// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::actions::ActionSet;
use crate::call_tree::CallTree;
use crate::error::CallTreeError;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Shares one [`CallTree`] between threads behind a mutex.
///
/// Every read or write of the live tree happens through the guard returned
/// by [`ConcurrentCallTree::lock`]. Critical sections are intentionally
/// short: index arithmetic and small copies only, no I/O and no name
/// formatting, so the cost imposed on the timed code path stays bounded.
pub struct ConcurrentCallTree {
    actions: Arc<ActionSet>,
    tree: Mutex<CallTree>,
}

impl ConcurrentCallTree {
    pub fn new(actions: Arc<ActionSet>) -> Self {
        Self {
            tree: Mutex::new(CallTree::new(actions.clone())),
            actions,
        }
    }

    pub fn actions(&self) -> &Arc<ActionSet> {
        &self.actions
    }

    /// Locks the shared tree; the guard's scope is the critical section.
    ///
    /// The lock is not reentrant: never call this while the same thread
    /// already holds the guard.
    pub fn lock(&self) -> MutexGuard<'_, CallTree> {
        self.tree.lock()
    }

    /// Deep-copies the tree under the lock and returns the copy.
    ///
    /// This is the only sanctioned way to read a stable snapshot while
    /// writers keep mutating the live tree; the returned value is frozen
    /// and needs no further synchronization.
    pub fn copy_call_tree(&self) -> CallTree {
        self.tree.lock().clone()
    }

    /// Appends a full copy of `source` under this tree's root.
    ///
    /// This is the merge point for private per-thread trees: each absorbed
    /// tree contributes its top-level branches as new siblings, never
    /// folding into branches already present.
    pub fn absorb(&self, source: &CallTree) -> Result<(), CallTreeError> {
        let mut tree = self.tree.lock();
        let root = tree.root();
        source.merge_into(root, &mut tree)
    }
}
