#![forbid(unsafe_code)]

//! Bulk loading of parsed subgraphs into a graph store.
//!
//! The loader is a thin adapter: it consumes only the public shape of the
//! parsed model (names, labels, properties, uniqueness descriptors) and
//! drives whatever backend implements [`GraphStore`]. A complete in-memory
//! store is included for tests and tooling.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;

use gw_core::{Subgraph, Value};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Backend seam. Create/find primitives only; the merge-or-create decisions
/// live in [`load`].
pub trait GraphStore {
    type NodeRef: Copy + Eq + Hash + fmt::Debug;
    type RelRef: Copy + Eq + fmt::Debug;

    fn create_node(&mut self) -> Self::NodeRef;

    /// First node carrying the label whose property `key` equals `value`.
    fn find_node(&mut self, label: &str, key: &str, value: &Value) -> Option<Self::NodeRef>;

    fn add_label(&mut self, node: Self::NodeRef, label: &str);

    fn set_node_property(&mut self, node: Self::NodeRef, key: &str, value: Value);

    fn create_relationship(
        &mut self,
        start: Self::NodeRef,
        end: Self::NodeRef,
        kind: &str,
    ) -> Self::RelRef;

    /// First relationship of the given type from `start` to `end`. When a
    /// discriminator is given, the relationship must also carry that
    /// key/value pair.
    fn find_relationship(
        &mut self,
        start: Self::NodeRef,
        end: Self::NodeRef,
        kind: &str,
        discriminator: Option<(&str, &Value)>,
    ) -> Option<Self::RelRef>;

    fn set_relationship_property(&mut self, rel: Self::RelRef, key: &str, value: Value);
}

/// Load a subgraph into the store. Unique nodes and relationships are looked
/// up before being created; everything else is created unconditionally.
/// Null-valued properties are placeholders and are never persisted.
///
/// Returns the explicitly-named (non-anonymous) nodes mapped to their store
/// references.
pub fn load<S: GraphStore>(
    store: &mut S,
    subgraph: &Subgraph,
) -> FxHashMap<String, S::NodeRef> {
    let order = subgraph.order();
    let size = subgraph.size();
    info!(order, size, "loading subgraph");

    let mut nodes: FxHashMap<&str, S::NodeRef> = FxHashMap::default();
    let mut named: FxHashMap<String, S::NodeRef> = FxHashMap::default();
    for node in subgraph.nodes() {
        let node_ref = load_node(store, node);
        nodes.insert(node.name(), node_ref);
        if node.is_named() {
            named.insert(node.name().to_string(), node_ref);
        }
    }

    for rel in subgraph.relationships() {
        let (Some(&start), Some(&end)) = (nodes.get(rel.start()), nodes.get(rel.end())) else {
            // Unreachable: the model merges endpoints before appending.
            debug!(start = rel.start(), end = rel.end(), "dangling endpoint");
            continue;
        };
        let rel_ref = if rel.is_unique() {
            let found = match rel.unique_key() {
                Some(key) => {
                    let value = rel.unique_value();
                    store.find_relationship(start, end, rel.kind(), Some((key, &value)))
                }
                None => store.find_relationship(start, end, rel.kind(), None),
            };
            found.unwrap_or_else(|| store.create_relationship(start, end, rel.kind()))
        } else {
            store.create_relationship(start, end, rel.kind())
        };
        for (key, value) in rel.properties() {
            if !value.is_null() {
                store.set_relationship_property(rel_ref, key, value.clone());
            }
        }
    }

    info!(order, size, "loaded subgraph");
    named
}

/// Merge-or-create one node: a unique node resolves through its
/// (label, key, value) triple before anything is created.
fn load_node<S: GraphStore>(store: &mut S, node: &gw_core::Node) -> S::NodeRef {
    let mut node_ref = None;
    if node.is_unique() {
        if let (Some(label), Some(key)) = (node.unique_label(), node.unique_key()) {
            let value = node.unique_value();
            node_ref = store.find_node(label, key, &value);
        }
    }
    let node_ref = node_ref.unwrap_or_else(|| store.create_node());
    for label in node.labels() {
        store.add_label(node_ref, label);
    }
    for (key, value) in node.properties() {
        if !value.is_null() {
            store.set_node_property(node_ref, key, value.clone());
        }
    }
    node_ref
}

/// Reference to a node held by a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryNodeRef(usize);

/// Reference to a relationship held by a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRelRef(usize);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredNode {
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRelationship {
    pub start: MemoryNodeRef,
    pub end: MemoryNodeRef,
    pub kind: String,
    pub properties: BTreeMap<String, Value>,
}

/// In-memory [`GraphStore`], the reference backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: Vec<StoredNode>,
    relationships: Vec<StoredRelationship>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    #[must_use]
    pub fn node(&self, node_ref: MemoryNodeRef) -> Option<&StoredNode> {
        self.nodes.get(node_ref.0)
    }

    #[must_use]
    pub fn relationship(&self, rel_ref: MemoryRelRef) -> Option<&StoredRelationship> {
        self.relationships.get(rel_ref.0)
    }

    #[must_use]
    pub fn relationships(&self) -> &[StoredRelationship] {
        &self.relationships
    }
}

impl GraphStore for MemoryStore {
    type NodeRef = MemoryNodeRef;
    type RelRef = MemoryRelRef;

    fn create_node(&mut self) -> MemoryNodeRef {
        self.nodes.push(StoredNode::default());
        MemoryNodeRef(self.nodes.len() - 1)
    }

    fn find_node(&mut self, label: &str, key: &str, value: &Value) -> Option<MemoryNodeRef> {
        self.nodes.iter().position(|node| {
            node.labels.contains(label) && node.properties.get(key) == Some(value)
        }).map(MemoryNodeRef)
    }

    fn add_label(&mut self, node: MemoryNodeRef, label: &str) {
        if let Some(stored) = self.nodes.get_mut(node.0) {
            stored.labels.insert(label.to_string());
        }
    }

    fn set_node_property(&mut self, node: MemoryNodeRef, key: &str, value: Value) {
        if let Some(stored) = self.nodes.get_mut(node.0) {
            stored.properties.insert(key.to_string(), value);
        }
    }

    fn create_relationship(
        &mut self,
        start: MemoryNodeRef,
        end: MemoryNodeRef,
        kind: &str,
    ) -> MemoryRelRef {
        self.relationships.push(StoredRelationship {
            start,
            end,
            kind: kind.to_string(),
            properties: BTreeMap::new(),
        });
        MemoryRelRef(self.relationships.len() - 1)
    }

    fn find_relationship(
        &mut self,
        start: MemoryNodeRef,
        end: MemoryNodeRef,
        kind: &str,
        discriminator: Option<(&str, &Value)>,
    ) -> Option<MemoryRelRef> {
        self.relationships
            .iter()
            .position(|rel| {
                rel.start == start
                    && rel.end == end
                    && rel.kind == kind
                    && discriminator
                        .is_none_or(|(key, value)| rel.properties.get(key) == Some(value))
            })
            .map(MemoryRelRef)
    }

    fn set_relationship_property(&mut self, rel: MemoryRelRef, key: &str, value: Value) {
        if let Some(stored) = self.relationships.get_mut(rel.0) {
            stored.properties.insert(key.to_string(), value);
        }
    }
}
