// Tree materialization - derive parent/children links from flat stubs

use crate::error::{HierNoteError, Result};
use crate::logical_id::Hierarchy;
use crate::node::{Node, NodeStub};
use std::collections::{BTreeMap, HashSet};

/// A tree view rebuilt from one flat stub collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized<T> {
    /// Nodes connected to the root, keyed by logical id
    pub nodes: BTreeMap<String, Node<T>>,
    pub root: Option<String>,
    /// Nodes with no ancestor chain to the root. Linked among themselves,
    /// so an orphaned subtree keeps its shape; each head has no parent.
    pub orphans: BTreeMap<String, Node<T>>,
    /// Keys that are not valid logical ids; left out entirely
    pub invalid: Vec<String>,
}

impl<T> Materialized<T> {
    pub fn empty() -> Self {
        Materialized {
            nodes: BTreeMap::new(),
            root: None,
            orphans: BTreeMap::new(),
            invalid: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, logical_id: &str) -> Option<&Node<T>> {
        self.nodes
            .get(logical_id)
            .or_else(|| self.orphans.get(logical_id))
    }

    pub fn root_node(&self) -> Option<&Node<T>> {
        self.root.as_deref().and_then(|id| self.nodes.get(id))
    }

    pub fn has_orphans(&self) -> bool {
        !self.orphans.is_empty()
    }

    /// Orphan ids whose own parent is missing, i.e. where the chain breaks.
    pub fn orphan_heads(&self) -> Vec<&str> {
        self.orphans
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.logical_id.as_str())
            .collect()
    }

    /// Fail with `Orphan` if any node is disconnected from the root.
    pub fn ensure_connected(self) -> Result<Self> {
        if self.orphans.is_empty() {
            return Ok(self);
        }
        Err(HierNoteError::Orphan {
            ids: self.orphans.keys().cloned().collect(),
        })
    }
}

/// Rebuild parent/children links for every stub in `stubs`.
///
/// Ids are walked in segment order with a stack holding the current ancestor
/// chain. Each id pops entries until the top is one of its ancestors; that
/// entry is its parent. When the stack runs dry the id has no ancestor and
/// is reported as an orphan instead of being hung off the root.
///
/// The root is the sentinel root id if present, otherwise the first id in
/// segment order. An empty input yields an empty result with no root.
pub fn materialize<T: Clone>(
    hierarchy: &Hierarchy,
    stubs: &BTreeMap<String, NodeStub<T>>,
) -> Materialized<T> {
    let mut result = Materialized::empty();

    let mut ids: Vec<&str> = Vec::with_capacity(stubs.len());
    for key in stubs.keys() {
        if hierarchy.is_root(key) || hierarchy.validate(key).is_ok() {
            ids.push(key);
        } else {
            log::warn!("Skipping node with invalid logical id '{key}'");
            result.invalid.push(key.clone());
        }
    }
    if ids.is_empty() {
        return result;
    }
    hierarchy.sort(&mut ids);

    let mut all: BTreeMap<String, Node<T>> = BTreeMap::new();
    let mut connected: HashSet<&str> = HashSet::new();
    // (logical id, reachable from root)
    let mut stack: Vec<(&str, bool)> = Vec::new();

    for (i, &id) in ids.iter().enumerate() {
        let stub = &stubs[id];
        let mut node = Node::from_stub(stub.clone(), None);

        if i == 0 {
            result.root = Some(id.to_string());
            connected.insert(id);
            stack.push((id, true));
            all.insert(id.to_string(), node);
            continue;
        }

        while let Some(&(top, _)) = stack.last() {
            if hierarchy.is_ancestor(top, id) {
                break;
            }
            stack.pop();
        }

        let reachable = match stack.last() {
            Some(&(parent_id, parent_connected)) => {
                node.parent = Some(stubs[parent_id].clone());
                if let Some(parent) = all.get_mut(parent_id) {
                    parent.children.push(stub.clone());
                }
                parent_connected
            }
            None => {
                log::warn!("Node '{id}' has no ancestor in the tree, reporting as orphan");
                false
            }
        };

        if reachable {
            connected.insert(id);
        }
        stack.push((id, reachable));
        all.insert(id.to_string(), node);
    }

    for (id, node) in all {
        if connected.contains(id.as_str()) {
            result.nodes.insert(id, node);
        } else {
            result.orphans.insert(id, node);
        }
    }
    result
}
