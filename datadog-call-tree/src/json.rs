// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON rendering of a frozen call-tree snapshot.
//!
//! Callers are expected to render a copy obtained from
//! [`crate::ConcurrentCallTree::copy_call_tree`], never the live tree.

use crate::call_tree::{CallTree, NodeId};
use crate::error::CallTreeError;
use anyhow::Context;
use serde_json::{Map, Value};
use std::io::Write;

impl CallTree {
    /// Renders this tree as a nested object: the root object carries
    /// one key per stat plus an `"actions"` array of child objects; every
    /// non-root object has `"name"`, `"start_time"`, `"stop_time"` and,
    /// when it has children, a nested `"actions"` array. Children keep
    /// link insertion order.
    pub fn to_json(&self) -> Result<Value, CallTreeError> {
        self.node_to_json(self.root())
    }

    fn node_to_json(&self, node: NodeId) -> Result<Value, CallTreeError> {
        let mut object = Map::new();
        if node == self.root() {
            for (key, value) in self.stats() {
                object.insert(key.to_owned(), Value::from(value));
            }
        } else {
            let name = self.actions().get_action_name(self.node_action_code(node))?;
            object.insert("name".to_owned(), Value::from(name));
            object.insert("start_time".to_owned(), Value::from(self.node_start_time(node)));
            object.insert("stop_time".to_owned(), Value::from(self.node_stop_time(node)));
        }

        let links = self.node_links(node);
        if !links.is_empty() {
            let mut children = Vec::with_capacity(links.len());
            for &(_, child) in links {
                children.push(self.node_to_json(child)?);
            }
            object.insert("actions".to_owned(), Value::Array(children));
        }

        Ok(Value::Object(object))
    }

    /// Renders to `writer`, pretty-printed or compact.
    pub fn write_json<W: Write>(&self, writer: &mut W, pretty: bool) -> anyhow::Result<()> {
        let value = self.to_json().context("failed to render call tree")?;
        if pretty {
            serde_json::to_writer_pretty(&mut *writer, &value)?;
        } else {
            serde_json::to_writer(&mut *writer, &value)?;
        }
        writer.flush()?;
        Ok(())
    }
}
