// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process call-tree timing instrumentation.
//!
//! Application code marks named actions (function bodies or blocks); per
//! execution the library reconstructs a nested call tree of those actions,
//! start/stop ticks plus arbitrary key/value statistics, and renders it as
//! JSON for offline analysis or flame-graph style visualization.
//!
//! The usual wiring: call sites create [`ActionGuard`]s (directly or via
//! [`profile_block!`] and friends), guards drive the thread's
//! [`CallTreeUpdater`], updaters mutate the [`ConcurrentCallTree`] under
//! its lock, and a periodic or shutdown flush copies a frozen snapshot out
//! for rendering.

mod actions;
mod call_tree;
mod clock;
mod concurrent;
mod error;
mod json;
mod profiler;
mod stats;
mod updater;

pub use actions::*;
pub use call_tree::*;
pub use clock::*;
pub use concurrent::*;
pub use error::*;
pub use profiler::*;
pub use stats::*;
pub use updater::*;

use std::hash::BuildHasherDefault;

pub(crate) type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
pub(crate) type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;
