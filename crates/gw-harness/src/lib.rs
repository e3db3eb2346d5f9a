#![forbid(unsafe_code)]

//! Comment-embedded assertions for weave documents.
//!
//! A document can state expectations about its own parse result inside
//! ordinary comments. Any comment line containing an `@` token is a
//! directive; everything before the `@` is ignored:
//!
//! ```text
//! /* @order 2
//!    @size 1
//!    @node alice :Person!name name=Alice
//!    @rel alice KNOWS! bob since=1999 */
//! ```
//!
//! Directives:
//! - `@order N` / `@size N` — node / relationship counts.
//! - `@node NAME args...` — the node exists; each extra arg is either
//!   `:Label` (has label), `:Label!key` (uniqueness descriptor), `key=value`
//!   (property, compared by rendered text form), or bare `key` (property is
//!   absent or explicitly null).
//! - `@rel START TYPE END args...` — a relationship of that type exists
//!   between the named nodes; `TYPE!` additionally requires it to be unique.
//!   Extra args are property assertions as for `@node`.

use gw_core::{Node, ParseError, Relationship, Subgraph};
use gw_parser::GraphReader;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

/// A failed or malformed assertion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("subgraph does not have order {expected} (found {found})")]
    Order { expected: usize, found: usize },
    #[error("subgraph does not have size {expected} (found {found})")]
    Size { expected: usize, found: usize },
    #[error("subgraph does not contain node \"{name}\"")]
    MissingNode { name: String },
    #[error("node \"{name}\" is not unique by label {label} and key {key}")]
    NodeNotUnique {
        name: String,
        label: String,
        key: String,
    },
    #[error("node \"{name}\" does not have label \"{label}\"")]
    MissingLabel { name: String, label: String },
    #[error("node \"{name}\" does not have property \"{key}\" with value {expected}")]
    NodeProperty {
        name: String,
        key: String,
        expected: String,
    },
    #[error("subgraph does not contain relationship \"{start} {kind} {end}\"")]
    MissingRelationship {
        start: String,
        kind: String,
        end: String,
    },
    #[error("relationship \"{start} {kind} {end}\" is not unique")]
    RelationshipNotUnique {
        start: String,
        kind: String,
        end: String,
    },
    #[error("relationship \"{start} {kind} {end}\" does not have property \"{key}\" with value {expected}")]
    RelationshipProperty {
        start: String,
        kind: String,
        end: String,
        key: String,
        expected: String,
    },
    #[error("malformed assertion directive: {line}")]
    Malformed { line: String },
}

/// Failure while checking a whole document: either the document did not
/// parse, or an assertion inside it did not hold.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HarnessError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Check(#[from] CheckError),
}

/// Counts from a successful document run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentReport {
    pub subgraphs: usize,
    pub assertions: usize,
}

/// Checks one subgraph against the directives in its own comments.
pub struct SubgraphCheck<'a> {
    subgraph: &'a Subgraph,
    /// Relationships whose endpoints are both explicitly named, keyed by
    /// start node name. Anonymous endpoints cannot be addressed by a
    /// directive, so those relationships are not indexed.
    outgoing: FxHashMap<&'a str, Vec<&'a Relationship>>,
}

impl<'a> SubgraphCheck<'a> {
    #[must_use]
    pub fn new(subgraph: &'a Subgraph) -> Self {
        let mut outgoing: FxHashMap<&'a str, Vec<&'a Relationship>> = FxHashMap::default();
        for rel in subgraph.relationships() {
            let both_named = subgraph.node(rel.start()).is_some_and(Node::is_named)
                && subgraph.node(rel.end()).is_some_and(Node::is_named);
            if both_named {
                outgoing.entry(rel.start()).or_default().push(rel);
            }
        }
        Self { subgraph, outgoing }
    }

    /// Run every directive. Returns the number of directives checked.
    pub fn run(&self) -> Result<usize, CheckError> {
        let mut checked = 0;
        for comment in self.subgraph.comments() {
            for line in comment.lines() {
                let Some(at) = line.find('@') else {
                    continue;
                };
                let args: Vec<&str> = line[at..].split_whitespace().collect();
                let Some(&directive) = args.first() else {
                    continue;
                };
                match directive {
                    "@order" => {
                        let expected = parse_count(&args, line)?;
                        let found = self.subgraph.order();
                        if found != expected {
                            return Err(CheckError::Order { expected, found });
                        }
                    }
                    "@size" => {
                        let expected = parse_count(&args, line)?;
                        let found = self.subgraph.size();
                        if found != expected {
                            return Err(CheckError::Size { expected, found });
                        }
                    }
                    "@node" => self.check_node(&args, line)?,
                    "@rel" => self.check_relationship(&args, line)?,
                    // Unknown directives carry no weight.
                    _ => continue,
                }
                checked += 1;
            }
        }
        Ok(checked)
    }

    fn check_node(&self, args: &[&str], line: &str) -> Result<(), CheckError> {
        let Some(&name) = args.get(1) else {
            return Err(CheckError::Malformed {
                line: line.to_string(),
            });
        };
        let Some(node) = self.subgraph.node(name) else {
            return Err(CheckError::MissingNode {
                name: name.to_string(),
            });
        };
        for &arg in &args[2..] {
            if let Some(label_spec) = arg.strip_prefix(':') {
                match label_spec.split_once('!') {
                    Some((label, key)) => {
                        let descriptor_matches = node.is_unique()
                            && node.unique_label() == Some(label)
                            && node.unique_key() == Some(key);
                        if !descriptor_matches {
                            return Err(CheckError::NodeNotUnique {
                                name: name.to_string(),
                                label: label.to_string(),
                                key: key.to_string(),
                            });
                        }
                    }
                    None => {
                        if !node.labels().contains(label_spec) {
                            return Err(CheckError::MissingLabel {
                                name: name.to_string(),
                                label: label_spec.to_string(),
                            });
                        }
                    }
                }
            } else {
                let (key, expected) = split_property(arg);
                if !property_holds(node.properties().get(key), expected) {
                    return Err(CheckError::NodeProperty {
                        name: name.to_string(),
                        key: key.to_string(),
                        expected: expected.unwrap_or("null").to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_relationship(&self, args: &[&str], line: &str) -> Result<(), CheckError> {
        let (Some(&start), Some(&spec), Some(&end)) = (args.get(1), args.get(2), args.get(3))
        else {
            return Err(CheckError::Malformed {
                line: line.to_string(),
            });
        };
        let (kind, must_be_unique) = match spec.strip_suffix('!') {
            Some(kind) => (kind, true),
            None => (spec, false),
        };
        let rel = self
            .outgoing
            .get(start)
            .and_then(|rels| {
                rels.iter()
                    .find(|rel| rel.kind() == kind && rel.end() == end)
            })
            .ok_or_else(|| CheckError::MissingRelationship {
                start: start.to_string(),
                kind: kind.to_string(),
                end: end.to_string(),
            })?;
        if must_be_unique && !rel.is_unique() {
            return Err(CheckError::RelationshipNotUnique {
                start: start.to_string(),
                kind: kind.to_string(),
                end: end.to_string(),
            });
        }
        for &arg in &args[4..] {
            let (key, expected) = split_property(arg);
            if !property_holds(rel.properties().get(key), expected) {
                return Err(CheckError::RelationshipProperty {
                    start: start.to_string(),
                    kind: kind.to_string(),
                    end: end.to_string(),
                    key: key.to_string(),
                    expected: expected.unwrap_or("null").to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Parse every subgraph in a document and check each against its own
/// assertions.
pub fn check_document(input: &str) -> Result<DocumentReport, HarnessError> {
    let mut reader = GraphReader::from_text(input);
    let mut report = DocumentReport::default();
    while reader.has_more() {
        let subgraph = reader.read_subgraph()?;
        report.assertions += SubgraphCheck::new(&subgraph).run()?;
        report.subgraphs += 1;
    }
    debug!(
        subgraphs = report.subgraphs,
        assertions = report.assertions,
        "checked document"
    );
    Ok(report)
}

fn parse_count(args: &[&str], line: &str) -> Result<usize, CheckError> {
    args.get(1)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| CheckError::Malformed {
            line: line.to_string(),
        })
}

/// `key=value` asserts a rendered value; a bare `key` asserts explicit null.
fn split_property(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (arg, None),
    }
}

/// A null expectation holds when the property is absent or explicitly null;
/// a value expectation compares against the rendered text form.
fn property_holds(actual: Option<&gw_core::Value>, expected: Option<&str>) -> bool {
    match expected {
        None => actual.is_none_or(gw_core::Value::is_null),
        Some(text) => actual.is_some_and(|value| value.to_string() == text),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_document, CheckError, HarnessError};

    fn check_err(input: &str) -> CheckError {
        match check_document(input).unwrap_err() {
            HarnessError::Check(err) => err,
            HarnessError::Parse(err) => panic!("unexpected parse error: {err}"),
        }
    }

    #[test]
    fn passing_document() {
        let input = r#"
/* @order 2
   @size 1
   @node alice :Person name=Alice
   @node bob :Person
   @rel alice KNOWS bob since=1999 */
(alice:Person {name:"Alice"})-[:KNOWS {since:1999}]->(bob:Person {name:"Bob"})
"#;
        let report = check_document(input).unwrap();
        assert_eq!(report.subgraphs, 1);
        assert_eq!(report.assertions, 5);
    }

    #[test]
    fn uniqueness_descriptor_assertion() {
        let input = r#"
/* @node p :Person!id
   @node p id=1 */
:Person:id=>(p {id:1})
"#;
        assert!(check_document(input).is_ok());
    }

    #[test]
    fn bare_key_asserts_null() {
        let input = r#"
/* @node p id */
(p:Person!id)
"#;
        assert!(check_document(input).is_ok());
    }

    #[test]
    fn wrong_order_is_reported() {
        let err = check_err("/* @order 3 */ (A) (B)");
        assert_eq!(
            err,
            CheckError::Order {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn missing_label_is_reported() {
        let err = check_err("/* @node a :Robot */ (a:Person)");
        assert!(matches!(err, CheckError::MissingLabel { .. }));
    }

    #[test]
    fn wrong_property_value_is_reported() {
        let err = check_err("/* @node a x=2 */ (a {x:1})");
        assert!(matches!(err, CheckError::NodeProperty { .. }));
    }

    #[test]
    fn required_unique_relationship_is_enforced() {
        let err = check_err("/* @rel a KNOWS! b */ (a)-[:KNOWS]->(b)");
        assert_eq!(
            err,
            CheckError::RelationshipNotUnique {
                start: "a".to_string(),
                kind: "KNOWS".to_string(),
                end: "b".to_string(),
            }
        );
    }

    #[test]
    fn relationships_with_anonymous_endpoints_are_not_addressable() {
        let err = check_err("/* @rel a KNOWS b */ (a)-[:KNOWS]->()");
        assert!(matches!(err, CheckError::MissingRelationship { .. }));
    }

    #[test]
    fn directives_check_each_subgraph_independently() {
        let input = "/* @order 2\n@size 1 */ (A)-[:X]->(B)\n~~~~\n/* @order 1 */ (C)";
        let report = check_document(input).unwrap();
        assert_eq!(report.subgraphs, 2);
        assert_eq!(report.assertions, 3);
    }

    #[test]
    fn malformed_count_is_reported() {
        let err = check_err("/* @order many */ (A)");
        assert!(matches!(err, CheckError::Malformed { .. }));
    }

    #[test]
    fn parse_failures_surface_as_parse_errors() {
        assert!(matches!(
            check_document("(A {b})"),
            Err(HarnessError::Parse(_))
        ));
    }
}
