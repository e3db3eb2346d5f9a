#![forbid(unsafe_code)]

//! Core data model for the weave graph-description format.
//!
//! A weave document is a stream of subgraphs separated by `~~~~` boundary
//! markers. Each subgraph is a set of nodes merged by name, an ordered list of
//! relationships, and any free-text comments the source carried. This crate
//! owns the model and its merge algebra; the grammar lives in `gw-parser`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustc_hash::FxHashMap;
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Property keys are unique; insertion order carries no meaning, so a sorted
/// map keeps rendered output deterministic.
pub type PropertyMap = BTreeMap<String, Value>;

/// Structural failure raised while reading a weave document.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum ParseError {
    /// A grammar-rule violation at a known source position. Line and column
    /// are 0-based.
    #[error("{message} at line {line} column {column}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    /// The scanner was asked to consume past the end of the stream. This is
    /// only reachable through input that runs out mid-token (an unterminated
    /// string or property map), so it carries no position.
    #[error("unexpected end of input")]
    UnexpectedEnd,
}

impl ParseError {
    #[must_use]
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    /// Source position of the violation, if one is known.
    #[must_use]
    pub const fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Syntax { line, column, .. } => Some((*line, *column)),
            Self::UnexpectedEnd => None,
        }
    }
}

/// A property value. The domain is closed: JSON-compatible scalars plus
/// homogeneous arrays of one scalar kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Array(ArrayValue),
}

/// A homogeneous array value. The element kind is inferred from the first
/// element at parse time; an empty array carries no kind at all.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Empty,
    Text(Vec<String>),
    Integer(Vec<i64>),
    Real(Vec<f64>),
    Boolean(Vec<bool>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(flag) => serializer.serialize_bool(*flag),
            Self::Integer(number) => serializer.serialize_i64(*number),
            Self::Real(number) => serializer.serialize_f64(*number),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Array(array) => array.serialize(serializer),
        }
    }
}

impl Serialize for ArrayValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_seq(Some(0))?.end(),
            Self::Text(items) => items.serialize(serializer),
            Self::Integer(items) => items.serialize(serializer),
            Self::Real(items) => items.serialize(serializer),
            Self::Boolean(items) => items.serialize(serializer),
        }
    }
}

impl fmt::Display for Value {
    /// Plain text form, used by the assertion harness to compare expected
    /// literals against parsed values. Strings render unquoted; whole-number
    /// reals keep a trailing `.0` so they stay distinguishable from integers.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(flag) => write!(f, "{flag}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Real(number) => {
                if number.is_finite() && number.fract() == 0.0 {
                    write!(f, "{number:.1}")
                } else {
                    write!(f, "{number}")
                }
            }
            Self::Text(text) => f.write_str(text),
            Self::Array(array) => {
                let rendered = serde_json::to_string(array).map_err(|_| fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

/// One parsed unit of a weave document: nodes merged by name, relationships
/// in source order, passthrough comments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subgraph {
    comments: Vec<String>,
    nodes: Vec<Node>,
    #[serde(skip)]
    index: FxHashMap<String, NodeId>,
    relationships: Vec<Relationship>,
}

/// Stable index of a node inside its owning [`Subgraph`]. Merging changes a
/// node's content, never its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub usize);

/// A node as described by the source: an identity plus labels, properties,
/// and at most one uniqueness descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    name: String,
    named: bool,
    labels: BTreeSet<String>,
    properties: PropertyMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_key: Option<String>,
}

impl Node {
    /// A node with no source name gets a synthetic one and is never a merge
    /// target for later mentions.
    #[must_use]
    pub fn new(name: Option<&str>) -> Self {
        let (name, named) = match name {
            Some(name) => (name.to_string(), true),
            None => (Uuid::new_v4().to_string(), false),
        };
        Self {
            name,
            named,
            labels: BTreeSet::new(),
            properties: PropertyMap::new(),
            unique_label: None,
            unique_key: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_named(&self) -> bool {
        self.named
    }

    #[must_use]
    pub const fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    #[must_use]
    pub const fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique_label.is_some() && self.unique_key.is_some()
    }

    #[must_use]
    pub fn unique_label(&self) -> Option<&str> {
        self.unique_label.as_deref()
    }

    #[must_use]
    pub fn unique_key(&self) -> Option<&str> {
        self.unique_key.as_deref()
    }

    /// Value under the uniqueness key, `Null` when unset. This is what a
    /// loader looks an existing node up by.
    #[must_use]
    pub fn unique_value(&self) -> Value {
        self.unique_key
            .as_deref()
            .and_then(|key| self.properties.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn merge_labels<I>(&mut self, labels: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.labels.extend(labels);
    }

    /// Last writer wins on conflicting keys.
    pub fn merge_properties(&mut self, properties: &PropertyMap) {
        for (key, value) in properties {
            self.properties.insert(key.clone(), value.clone());
        }
    }

    /// Fold a later mention of the same logical node into this one. Labels
    /// union, properties overwrite key-by-key, a non-empty name replaces the
    /// stored one. The uniqueness descriptor is left alone; only an explicit
    /// [`Node::set_unique`] may change it.
    pub fn merge(&mut self, other: &Node) {
        if !other.name.is_empty() {
            self.name.clone_from(&other.name);
        }
        self.merge_labels(other.labels.iter().cloned());
        self.merge_properties(&other.properties);
    }

    /// Install the uniqueness descriptor. The label joins the label set and
    /// the key gains a `Null` placeholder property if absent, which keeps the
    /// invariant that the descriptor always points at real entries. A call
    /// missing either half is a no-op.
    pub fn set_unique(&mut self, label: Option<&str>, key: Option<&str>) {
        let (Some(label), Some(key)) = (label, key) else {
            return;
        };
        self.labels.insert(label.to_string());
        self.unique_label = Some(label.to_string());
        self.properties
            .entry(key.to_string())
            .or_insert(Value::Null);
        self.unique_key = Some(key.to_string());
    }
}

impl fmt::Display for Node {
    /// Round-trippable source form: `(name:Label!key {"x":1})`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        f.write_str(&self.name)?;
        for label in &self.labels {
            write!(f, ":{label}")?;
            if self.unique_label.as_deref() == Some(label) {
                if let Some(key) = &self.unique_key {
                    write!(f, "!{key}")?;
                }
            }
        }
        if !self.properties.is_empty() {
            let rendered = serde_json::to_string(&self.properties).map_err(|_| fmt::Error)?;
            write!(f, " {rendered}")?;
        }
        f.write_str(")")
    }
}

/// A directed edge between two nodes of the owning subgraph. Endpoints are
/// held by name and resolve through the subgraph's node table at read time;
/// a relationship never owns its nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    start: String,
    kind: String,
    properties: PropertyMap,
    end: String,
    unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_key: Option<String>,
}

impl Relationship {
    #[must_use]
    pub fn new(start: impl Into<String>, kind: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            kind: kind.into(),
            properties: PropertyMap::new(),
            end: end.into(),
            unique: false,
            unique_key: None,
        }
    }

    #[must_use]
    pub fn start(&self) -> &str {
        &self.start
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn end(&self) -> &str {
        &self.end
    }

    #[must_use]
    pub const fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub fn unique_key(&self) -> Option<&str> {
        self.unique_key.as_deref()
    }

    /// Value under the uniqueness key, `Null` when unset.
    #[must_use]
    pub fn unique_value(&self) -> Value {
        self.unique_key
            .as_deref()
            .and_then(|key| self.properties.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Mark the relationship for merge-by-lookup. With no key, uniqueness is
    /// by (start, type, end) alone.
    pub fn set_unique(&mut self, key: Option<String>) {
        self.unique = true;
        self.unique_key = key;
    }

    pub fn merge_properties(&mut self, properties: &PropertyMap) {
        for (key, value) in properties {
            self.properties.insert(key.clone(), value.clone());
        }
    }
}

impl fmt::Display for Relationship {
    /// Round-trippable source form: `(a)-[:TYPE!key {"x":1}]->(b)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[:{}", self.start, self.kind)?;
        if self.unique {
            f.write_str("!")?;
            if let Some(key) = &self.unique_key {
                f.write_str(key)?;
            }
        }
        if !self.properties.is_empty() {
            let rendered = serde_json::to_string(&self.properties).map_err(|_| fmt::Error)?;
            write!(f, " {rendered}")?;
        }
        write!(f, "]->({})", self.end)
    }
}

impl Subgraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            comments: Vec::new(),
            nodes: Vec::new(),
            index: FxHashMap::default(),
            relationships: Vec::new(),
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    /// Number of relationships.
    #[must_use]
    pub fn size(&self) -> usize {
        self.relationships.len()
    }

    #[must_use]
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Relationships in the order the source produced them. The model never
    /// deduplicates them; that is a loader concern.
    #[must_use]
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|id| &self.nodes[id.0])
    }

    #[must_use]
    pub fn node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    /// Fold a node into the table. An existing node with the same name
    /// absorbs the new mention; otherwise the node is inserted verbatim.
    pub fn merge_node(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.index.get(node.name()) {
            self.nodes[id.0].merge(&node);
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(node.name().to_string(), id);
        self.nodes.push(node);
        id
    }

    /// Install a uniqueness descriptor on an already-merged node, overwriting
    /// any prior one. Used by hook statements.
    pub fn set_node_unique(&mut self, id: NodeId, label: &str, key: Option<&str>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.set_unique(Some(label), key);
        }
    }

    /// Append a relationship. Both endpoint nodes are merged first, so
    /// referencing an undeclared node implicitly declares it. The stored
    /// endpoint names are taken from the nodes themselves.
    pub fn add_relationship(&mut self, start: Node, mut rel: Relationship, end: Node) {
        rel.start = start.name().to_string();
        rel.end = end.name().to_string();
        self.merge_node(start);
        self.merge_node(end);
        self.relationships.push(rel);
    }
}

impl Default for Subgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Subgraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::with_capacity(self.nodes.len() + self.relationships.len());
        for node in &self.nodes {
            lines.push(node.to_string());
        }
        for rel in &self.relationships {
            lines.push(rel.to_string());
        }
        f.write_str(&lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::{ArrayValue, Node, ParseError, PropertyMap, Relationship, Subgraph, Value};

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn anonymous_nodes_get_distinct_synthetic_names() {
        let a = Node::new(None);
        let b = Node::new(None);
        assert!(!a.is_named());
        assert!(!b.is_named());
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn merge_unions_labels_and_overwrites_properties() {
        let mut a = Node::new(Some("A"));
        a.merge_labels(["Person".to_string()]);
        a.merge_properties(&props(&[("x", Value::Integer(1))]));

        let mut again = Node::new(Some("A"));
        again.merge_labels(["Employee".to_string()]);
        again.merge_properties(&props(&[("x", Value::Integer(2)), ("y", Value::Integer(3))]));

        a.merge(&again);
        assert_eq!(a.labels().len(), 2);
        assert_eq!(a.properties().get("x"), Some(&Value::Integer(2)));
        assert_eq!(a.properties().get("y"), Some(&Value::Integer(3)));
    }

    #[test]
    fn merge_does_not_clear_uniqueness() {
        let mut a = Node::new(Some("A"));
        a.set_unique(Some("Person"), Some("id"));

        let plain = Node::new(Some("A"));
        a.merge(&plain);
        assert!(a.is_unique());
        assert_eq!(a.unique_label(), Some("Person"));
        assert_eq!(a.unique_key(), Some("id"));
    }

    #[test]
    fn set_unique_backfills_label_and_null_placeholder() {
        let mut node = Node::new(Some("p"));
        node.set_unique(Some("Person"), Some("id"));
        assert!(node.labels().contains("Person"));
        assert_eq!(node.properties().get("id"), Some(&Value::Null));
        assert_eq!(node.unique_value(), Value::Null);

        node.merge_properties(&props(&[("id", Value::Integer(1))]));
        assert_eq!(node.unique_value(), Value::Integer(1));
    }

    #[test]
    fn set_unique_requires_both_halves() {
        let mut node = Node::new(Some("p"));
        node.set_unique(Some("Person"), None);
        assert!(!node.is_unique());
        assert!(node.labels().is_empty());
    }

    #[test]
    fn subgraph_merges_repeated_names_into_one_node() {
        let mut subgraph = Subgraph::new();
        let mut first = Node::new(Some("A"));
        first.merge_properties(&props(&[("x", Value::Integer(1))]));
        let mut second = Node::new(Some("A"));
        second.merge_properties(&props(&[("y", Value::Integer(2))]));

        let id1 = subgraph.merge_node(first);
        let id2 = subgraph.merge_node(second);
        assert_eq!(id1, id2);
        assert_eq!(subgraph.order(), 1);

        let node = subgraph.node("A").unwrap();
        assert_eq!(node.properties().get("x"), Some(&Value::Integer(1)));
        assert_eq!(node.properties().get("y"), Some(&Value::Integer(2)));
    }

    #[test]
    fn add_relationship_declares_endpoints() {
        let mut subgraph = Subgraph::new();
        let a = Node::new(Some("A"));
        let b = Node::new(Some("B"));
        let rel = Relationship::new("A", "KNOWS", "B");
        subgraph.add_relationship(a, rel, b);
        assert_eq!(subgraph.order(), 2);
        assert_eq!(subgraph.size(), 1);
        assert!(subgraph.node("A").is_some());
        assert!(subgraph.node("B").is_some());
    }

    #[test]
    fn relationship_unique_without_key() {
        let mut rel = Relationship::new("A", "KNOWS", "B");
        assert!(!rel.is_unique());
        rel.set_unique(None);
        assert!(rel.is_unique());
        assert_eq!(rel.unique_key(), None);
        assert_eq!(rel.unique_value(), Value::Null);
    }

    #[test]
    fn node_display_round_trips_source_shape() {
        let mut node = Node::new(Some("p"));
        node.set_unique(Some("Person"), Some("id"));
        node.merge_properties(&props(&[("id", Value::Integer(1))]));
        assert_eq!(node.to_string(), r#"(p:Person!id {"id":1})"#);
    }

    #[test]
    fn relationship_display_round_trips_source_shape() {
        let mut rel = Relationship::new("a", "KNOWS", "b");
        rel.set_unique(Some("since".to_string()));
        rel.merge_properties(&props(&[("since", Value::Integer(1999))]));
        assert_eq!(rel.to_string(), r#"(a)-[:KNOWS!since {"since":1999}]->(b)"#);
    }

    #[test]
    fn value_display_forms() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-7).to_string(), "-7");
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Real(1.5).to_string(), "1.5");
        assert_eq!(Value::Text("plain".to_string()).to_string(), "plain");
        assert_eq!(
            Value::Array(ArrayValue::Integer(vec![1, 2])).to_string(),
            "[1,2]"
        );
    }

    #[test]
    fn value_serializes_as_json() {
        let map = props(&[
            ("a", Value::Array(ArrayValue::Real(vec![1.0, 2.5]))),
            ("b", Value::Null),
            ("c", Value::Text("s".to_string())),
        ]);
        let rendered = serde_json::to_string(&map).unwrap();
        assert_eq!(rendered, r#"{"a":[1.0,2.5],"b":null,"c":"s"}"#);
    }

    #[test]
    fn parse_error_display_carries_position() {
        let err = ParseError::syntax("Unexpected character", 0, 5);
        assert_eq!(err.to_string(), "Unexpected character at line 0 column 5");
        assert_eq!(err.position(), Some((0, 5)));
        assert_eq!(ParseError::UnexpectedEnd.position(), None);
    }
}
