#![forbid(unsafe_code)]

//! Streaming parser for the weave graph-description format.
//!
//! Weave describes property graphs as chains of nodes and relationship boxes:
//!
//! ```text
//! /* alice knows bob */
//! (alice:Person!name {name:"Alice"})-[:KNOWS {since:1999}]->(bob:Person {name:"Bob"})
//! :Person:name=>(alice)
//! ~~~~
//! ```
//!
//! A document is a sequence of subgraphs separated by `~~~~` boundary
//! markers. [`GraphReader`] reads one subgraph at a time from a character
//! source with one-character lookahead; [`parse_document`] drains a string
//! into the full sequence.

mod reader;
mod scanner;

pub use reader::GraphReader;
pub use scanner::Scanner;

use gw_core::{ParseError, Subgraph};

/// Parse every subgraph in a document. Fails on the first grammar violation.
pub fn parse_document(input: &str) -> Result<Vec<Subgraph>, ParseError> {
    let mut reader = GraphReader::from_text(input);
    let mut subgraphs = Vec::new();
    while reader.has_more() {
        subgraphs.push(reader.read_subgraph()?);
    }
    Ok(subgraphs)
}

#[cfg(test)]
mod tests {
    use super::parse_document;

    #[test]
    fn empty_input_yields_no_subgraphs() {
        assert_eq!(parse_document("").unwrap().len(), 0);
    }

    #[test]
    fn boundaries_split_a_document() {
        let subgraphs = parse_document("(A)-[:X]->(B) ~~~~ (C) (D)").unwrap();
        assert_eq!(subgraphs.len(), 2);
        assert_eq!(subgraphs[0].order(), 2);
        assert_eq!(subgraphs[0].size(), 1);
        assert_eq!(subgraphs[1].order(), 2);
        assert_eq!(subgraphs[1].size(), 0);
    }

    #[test]
    fn errors_abort_the_document() {
        assert!(parse_document("(A) ^").is_err());
    }
}
