// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::actions::{ActionCode, ActionSet};
use crate::error::CallTreeError;
use crate::stats::{StatType, StatValue};
use crate::FxIndexMap;
use std::sync::Arc;

/// Index of a node within its [`CallTree`] arena.
///
/// Nodes are referred to by index, never by reference: the backing storage
/// grows and may reallocate, so references would not survive later
/// insertions. A missing node is `Option<NodeId>::None`, not a sentinel.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// # Panics
    /// Panics if the offset does not fit a `u32`.
    pub(crate) fn from_offset(offset: usize) -> Self {
        match u32::try_from(offset) {
            Ok(raw) => Self(raw),
            Err(_) => panic!("node offset {offset} exceeds the representable range"),
        }
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct Node {
    action_code: ActionCode,
    start_time: i64,
    stop_time: i64,
    /// Child links in insertion order. Duplicate codes are allowed; merge
    /// lookups scan newest first.
    links: Vec<(ActionCode, NodeId)>,
}

impl Node {
    fn new(action_code: ActionCode) -> Self {
        Self {
            action_code,
            start_time: 0,
            stop_time: 0,
            links: Vec::new(),
        }
    }
}

/// Append-only call-tree arena.
///
/// Each node records one timed action: its code, start/stop ticks, and the
/// actions that happened inside it. Index 0 is always the root, which
/// carries [`ActionCode::NO_ACTION`] and the tree-level stats map. The
/// arena only grows; nodes are never removed or reused, so a [`NodeId`]
/// stays valid for the life of the tree.
///
/// `Clone` is the snapshot operation: structure and stats are deep-copied,
/// the action registry is shared (it is append-only, so a frozen copy
/// resolves names exactly like the live tree).
#[derive(Clone)]
pub struct CallTree {
    nodes: Vec<Node>,
    actions: Arc<ActionSet>,
    stats: FxIndexMap<String, StatValue>,
}

impl CallTree {
    pub fn new(actions: Arc<ActionSet>) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            actions,
            stats: FxIndexMap::default(),
        };
        tree.new_node(ActionCode::NO_ACTION);
        tree
    }

    /// The root node. Always index 0.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn actions(&self) -> &Arc<ActionSet> {
        &self.actions
    }

    /// Total number of nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn new_node(&mut self, action_code: ActionCode) -> NodeId {
        let id = NodeId::from_offset(self.nodes.len());
        self.nodes.push(Node::new(action_code));
        id
    }

    /// Creates a new child of `node` with `action_code` and returns it.
    ///
    /// Always creates, never deduplicates; callers wanting reuse go through
    /// [`CallTree::find_link`] first. The sentinel is rejected: only the
    /// root carries [`ActionCode::NO_ACTION`], and a nameless non-root
    /// node could not be rendered.
    pub fn add_new_link(
        &mut self,
        node: NodeId,
        action_code: ActionCode,
    ) -> Result<NodeId, CallTreeError> {
        if action_code == ActionCode::NO_ACTION || !self.actions.code_is_valid(action_code) {
            return Err(CallTreeError::InvalidActionCode(action_code));
        }
        let child = self.new_node(action_code);
        self.nodes[node.index()].links.push((action_code, child));
        Ok(child)
    }

    /// Finds a child of `node` with `action_code`, scanning links newest to
    /// oldest. Merge mode reuses the most recent same-named child, so the
    /// reverse scan finds a hot child immediately.
    pub fn find_link(&self, node: NodeId, action_code: ActionCode) -> Option<NodeId> {
        self.nodes[node.index()]
            .links
            .iter()
            .rev()
            .find(|(code, _)| *code == action_code)
            .map(|&(_, child)| child)
    }

    /// Child links of `node` in insertion order.
    pub fn node_links(&self, node: NodeId) -> &[(ActionCode, NodeId)] {
        &self.nodes[node.index()].links
    }

    pub fn node_action_code(&self, node: NodeId) -> ActionCode {
        self.nodes[node.index()].action_code
    }

    pub fn node_start_time(&self, node: NodeId) -> i64 {
        self.nodes[node.index()].start_time
    }

    pub fn set_node_start_time(&mut self, node: NodeId, time: i64) {
        self.nodes[node.index()].start_time = time;
    }

    pub fn node_stop_time(&self, node: NodeId) -> i64 {
        self.nodes[node.index()].stop_time
    }

    pub fn set_node_stop_time(&mut self, node: NodeId, time: i64) {
        self.nodes[node.index()].stop_time = time;
    }

    /// Attaches a stat at the tree root, overwriting any previous value
    /// under the same key.
    pub fn add_stat(&mut self, key: impl Into<String>, value: impl Into<StatValue>) {
        self.stats.insert(key.into(), value.into());
    }

    pub fn has_stat(&self, key: &str) -> bool {
        self.stats.contains_key(key)
    }

    /// Reads a stat back with its concrete type.
    pub fn get_stat<T: StatType>(&self, key: &str) -> Result<T, CallTreeError> {
        let value = self
            .stats
            .get(key)
            .ok_or_else(|| CallTreeError::KeyNotFound(key.to_owned()))?;
        T::from_value(value).ok_or_else(|| CallTreeError::TypeMismatch {
            key: key.to_owned(),
            stored: value.kind(),
            requested: T::KIND,
        })
    }

    /// Stats in insertion order, for the renderer.
    pub fn stats(&self) -> impl Iterator<Item = (&str, &StatValue)> {
        self.stats.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Recursively clones this tree's structure under `target_node` in
    /// `target`.
    ///
    /// Every visited non-root node copies its start/stop ticks into a fresh
    /// child created in the target; pre-existing target children are never
    /// reused, so a merge always appends the full source subtree as new
    /// branches. Root stats are not copied; that is the caller's concern.
    /// This is how per-thread trees become siblings under one shared root.
    pub fn merge_into(
        &self,
        target_node: NodeId,
        target: &mut CallTree,
    ) -> Result<(), CallTreeError> {
        self.merge_node(self.root(), target_node, target)
    }

    fn merge_node(
        &self,
        source: NodeId,
        target_node: NodeId,
        target: &mut CallTree,
    ) -> Result<(), CallTreeError> {
        if source != self.root() {
            target.set_node_start_time(target_node, self.node_start_time(source));
            target.set_node_stop_time(target_node, self.node_stop_time(source));
        }
        for &(code, child) in &self.nodes[source.index()].links {
            let target_child = target.add_new_link(target_node, code)?;
            self.merge_node(child, target_child, target)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_actions(names: &[&str]) -> (CallTree, Vec<ActionCode>) {
        let actions = Arc::new(ActionSet::new());
        let codes = names
            .iter()
            .map(|name| actions.define_new_action(name))
            .collect();
        (CallTree::new(actions), codes)
    }

    #[test]
    fn root_carries_the_sentinel() {
        let (tree, _) = tree_with_actions(&[]);
        assert_eq!(1, tree.node_count());
        assert_eq!(ActionCode::NO_ACTION, tree.node_action_code(tree.root()));
        assert_eq!(0, tree.node_start_time(tree.root()));
        assert_eq!(0, tree.node_stop_time(tree.root()));
    }

    #[test]
    fn add_new_link_always_creates() {
        let (mut tree, codes) = tree_with_actions(&["read"]);
        let root = tree.root();
        let first = tree.add_new_link(root, codes[0]).unwrap();
        let second = tree.add_new_link(root, codes[0]).unwrap();
        assert_ne!(first, second);
        assert_eq!(2, tree.node_links(root).len());
        assert_eq!(3, tree.node_count());
    }

    #[test]
    fn add_new_link_rejects_unregistered_codes() {
        let (mut tree, _) = tree_with_actions(&["read"]);
        let root = tree.root();
        let bogus = ActionCode::from_offset(5);
        assert_eq!(
            Err(CallTreeError::InvalidActionCode(bogus)),
            tree.add_new_link(root, bogus)
        );
        // No partial node was created.
        assert_eq!(1, tree.node_count());
        assert!(tree.node_links(root).is_empty());
    }

    #[test]
    fn add_new_link_rejects_the_sentinel() {
        let (mut tree, _) = tree_with_actions(&["read"]);
        let root = tree.root();
        assert_eq!(
            Err(CallTreeError::InvalidActionCode(ActionCode::NO_ACTION)),
            tree.add_new_link(root, ActionCode::NO_ACTION)
        );
        assert_eq!(1, tree.node_count());
        assert!(tree.node_links(root).is_empty());
    }

    #[test]
    fn find_link_returns_the_newest_match() {
        let (mut tree, codes) = tree_with_actions(&["read", "parse"]);
        let root = tree.root();
        let older = tree.add_new_link(root, codes[0]).unwrap();
        tree.add_new_link(root, codes[1]).unwrap();
        let newer = tree.add_new_link(root, codes[0]).unwrap();
        assert_ne!(older, newer);
        assert_eq!(Some(newer), tree.find_link(root, codes[0]));
    }

    #[test]
    fn find_link_misses_on_absent_code() {
        let (mut tree, codes) = tree_with_actions(&["read", "parse"]);
        let root = tree.root();
        tree.add_new_link(root, codes[0]).unwrap();
        assert_eq!(None, tree.find_link(root, codes[1]));
    }

    #[test]
    fn node_ids_stay_valid_while_the_arena_grows() {
        let (mut tree, codes) = tree_with_actions(&["hot"]);
        let root = tree.root();
        let first = tree.add_new_link(root, codes[0]).unwrap();
        tree.set_node_start_time(first, 17);
        // Force plenty of reallocation of the backing storage.
        let mut cursor = first;
        for _ in 0..10_000 {
            cursor = tree.add_new_link(cursor, codes[0]).unwrap();
        }
        assert_eq!(17, tree.node_start_time(first));
        assert_eq!(codes[0], tree.node_action_code(first));
    }

    #[test]
    fn stats_round_trip_by_type() {
        let (mut tree, _) = tree_with_actions(&[]);
        tree.add_stat("enabled", true);
        tree.add_stat("count", 42i64);
        tree.add_stat("ratio", 0.5f64);
        tree.add_stat("host", "worker-3");

        assert!(tree.has_stat("count"));
        assert!(!tree.has_stat("missing"));
        assert_eq!(true, tree.get_stat::<bool>("enabled").unwrap());
        assert_eq!(42, tree.get_stat::<i64>("count").unwrap());
        assert_eq!(0.5, tree.get_stat::<f64>("ratio").unwrap());
        assert_eq!("worker-3", tree.get_stat::<String>("host").unwrap());
    }

    #[test]
    fn stat_errors_distinguish_missing_from_mistyped() {
        let (mut tree, _) = tree_with_actions(&[]);
        tree.add_stat("count", 42i64);

        assert_eq!(
            Err(CallTreeError::KeyNotFound("missing".into())),
            tree.get_stat::<i64>("missing")
        );
        assert_eq!(
            Err(CallTreeError::TypeMismatch {
                key: "count".into(),
                stored: "int",
                requested: "bool",
            }),
            tree.get_stat::<bool>("count")
        );
    }

    #[test]
    fn merge_appends_an_isomorphic_copy() {
        let actions = Arc::new(ActionSet::new());
        let read = actions.define_new_action("read");
        let parse = actions.define_new_action("parse");

        let mut source = CallTree::new(actions.clone());
        let s_read = source.add_new_link(source.root(), read).unwrap();
        source.set_node_start_time(s_read, 10);
        source.set_node_stop_time(s_read, 25);
        let s_parse = source.add_new_link(s_read, parse).unwrap();
        source.set_node_start_time(s_parse, 12);
        source.set_node_stop_time(s_parse, 20);

        let mut target = CallTree::new(actions);
        // A pre-existing child with the same code must not be folded into.
        let existing = target.add_new_link(target.root(), read).unwrap();
        target.set_node_start_time(existing, 1);

        source.merge_into(target.root(), &mut target).unwrap();

        let root_links = target.node_links(target.root());
        assert_eq!(2, root_links.len());
        let merged = root_links[1].1;
        assert_ne!(existing, merged);
        assert_eq!(read, target.node_action_code(merged));
        assert_eq!(10, target.node_start_time(merged));
        assert_eq!(25, target.node_stop_time(merged));

        let merged_links = target.node_links(merged);
        assert_eq!(1, merged_links.len());
        let merged_parse = merged_links[0].1;
        assert_eq!(parse, target.node_action_code(merged_parse));
        assert_eq!(12, target.node_start_time(merged_parse));
        assert_eq!(20, target.node_stop_time(merged_parse));

        // The pre-existing branch is untouched.
        assert_eq!(1, target.node_start_time(existing));
        assert!(target.node_links(existing).is_empty());
    }

    #[test]
    fn merge_does_not_copy_stats() {
        let actions = Arc::new(ActionSet::new());
        let mut source = CallTree::new(actions.clone());
        source.add_stat("host", "a");
        let mut target = CallTree::new(actions);
        source.merge_into(target.root(), &mut target).unwrap();
        assert!(!target.has_stat("host"));
    }

    #[test]
    fn clone_is_a_deep_snapshot() {
        let (mut tree, codes) = tree_with_actions(&["read"]);
        let child = tree.add_new_link(tree.root(), codes[0]).unwrap();
        tree.set_node_start_time(child, 10);
        tree.add_stat("count", 1i64);

        let snapshot = tree.clone();
        tree.set_node_start_time(child, 99);
        tree.add_new_link(tree.root(), codes[0]).unwrap();
        tree.add_stat("count", 2i64);

        assert_eq!(10, snapshot.node_start_time(child));
        assert_eq!(1, snapshot.node_links(snapshot.root()).len());
        assert_eq!(1, snapshot.get_stat::<i64>("count").unwrap());
    }
}
