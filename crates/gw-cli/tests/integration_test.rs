//! Integration tests for the graphweave pipeline.
//!
//! These tests verify the end-to-end flow from parsing through loading into
//! the in-memory store, and the assertion harness over whole documents.

use gw_core::Value;
use gw_harness::check_document;
use gw_loader::{load, MemoryStore};
use gw_parser::parse_document;

/// A document with chains, a hook, and a comment parses into one subgraph
/// carrying exactly the entities it names.
#[test]
fn document_parses_into_merged_subgraph() {
    let input = r#"
/* friends */
(alice:Person {"name": "Alice", "age": 33})
(bob:Person {"name": "Bob"})
(alice)-[:KNOWS {"since": 1999}]->(bob)
:Person:name=>(alice)
"#;

    let subgraphs = parse_document(input).expect("document should parse");
    assert_eq!(subgraphs.len(), 1);

    let subgraph = &subgraphs[0];
    assert_eq!(subgraph.order(), 2, "Expected 2 nodes");
    assert_eq!(subgraph.size(), 1, "Expected 1 relationship");
    assert_eq!(subgraph.comments(), ["friends"]);

    let alice = subgraph.node("alice").expect("alice should exist");
    assert!(alice.labels().contains("Person"));
    assert_eq!(alice.properties().get("age"), Some(&Value::Integer(33)));
    assert!(alice.is_unique(), "hook should mark alice unique");
    assert_eq!(alice.unique_key(), Some("name"));

    let rel = &subgraph.relationships()[0];
    assert_eq!(rel.start(), "alice");
    assert_eq!(rel.kind(), "KNOWS");
    assert_eq!(rel.end(), "bob");
    assert_eq!(rel.properties().get("since"), Some(&Value::Integer(1999)));
}

/// Loading a parsed document materialises nodes and relationships in the
/// store and returns references for every named node.
#[test]
fn parsed_document_loads_into_memory_store() {
    let input = r#"
(alice:Person {"name": "Alice"})-[:KNOWS]->(bob:Person {"name": "Bob"})
(bob)-[:KNOWS]->(carol:Person {"name": "Carol"})
"#;

    let subgraphs = parse_document(input).expect("document should parse");
    let mut store = MemoryStore::new();
    let named = load(&mut store, &subgraphs[0]);

    assert_eq!(store.node_count(), 3);
    assert_eq!(store.relationship_count(), 2);
    assert_eq!(named.len(), 3);

    let alice = store
        .node(named["alice"])
        .expect("alice ref should resolve");
    assert!(alice.labels.contains("Person"));
    assert_eq!(
        alice.properties.get("name"),
        Some(&Value::Text("Alice".to_string()))
    );
}

/// Unique nodes merge across separately loaded documents instead of piling
/// up duplicates.
#[test]
fn unique_nodes_merge_across_documents() {
    let first = r#":Person:name=>(a {"name": "Alice"})"#;
    let second = r#":Person:name=>(a {"name": "Alice", "age": 34})"#;

    let mut store = MemoryStore::new();
    for input in [first, second] {
        let subgraphs = parse_document(input).expect("document should parse");
        load(&mut store, &subgraphs[0]);
    }

    assert_eq!(store.node_count(), 1, "both loads should hit the same node");
}

/// A boundary marker splits a stream into independently loaded subgraphs.
#[test]
fn boundary_separated_subgraphs_load_independently() {
    let input = "(a)-[:X]->(b)\n~~~~\n(a)-[:X]->(b)";

    let subgraphs = parse_document(input).expect("document should parse");
    assert_eq!(subgraphs.len(), 2);

    let mut store = MemoryStore::new();
    for subgraph in &subgraphs {
        load(&mut store, subgraph);
    }

    // Nothing is unique, so the second subgraph appends fresh entities.
    assert_eq!(store.node_count(), 4);
    assert_eq!(store.relationship_count(), 2);
}

/// The assertion harness runs every directive embedded in a document.
#[test]
fn embedded_assertions_check_the_whole_document() {
    let input = r#"
/* @order 3
   @size 2
   @node alice :Person name=Alice
   @rel alice KNOWS bob since=1999 */
(alice:Person {"name": "Alice"})-[:KNOWS {"since": 1999}]->(bob:Person)
(bob)-[:KNOWS]->(carol)
~~~~
/* @order 1
   @node hub :Hub!id */
:Hub:id=>(hub {"id": 7})
"#;

    let report = check_document(input).expect("all assertions should hold");
    assert_eq!(report.subgraphs, 2);
    assert_eq!(report.assertions, 6);
}

/// A failing assertion surfaces as a check error, not a panic or a parse
/// error.
#[test]
fn failing_assertion_is_reported() {
    let input = "/* @order 5 */ (a)-[:X]->(b)";
    let err = check_document(input).expect_err("assertion should fail");
    assert!(err.to_string().contains("order 5"));
}

/// Syntax errors carry the same positions through the whole pipeline.
#[test]
fn parse_errors_keep_line_and_column() {
    let err = parse_document("(A {b})").expect_err("bare key is invalid JSON");
    assert_eq!(
        err.to_string(),
        "Unexpected character at line 0 column 5"
    );
    assert_eq!(err.position(), Some((0, 5)));
}
