//! Recursive-descent grammar for weave documents.
//!
//! Every rule is a method on [`GraphReader`] that consumes characters through
//! the shared [`Scanner`]. Rules check availability before consuming, so the
//! scanner's end-of-input contract only trips on genuinely truncated input.
//! Whitespace is skipped between tokens; no rule assumes contiguous input.

use std::collections::BTreeSet;

use gw_core::{ArrayValue, Node, ParseError, PropertyMap, Relationship, Subgraph, Value};
use tracing::debug;

use crate::scanner::Scanner;

/// Arrow between a node and a relationship box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrow {
    /// `<-`
    Left,
    /// `-`
    Plain,
    /// `->`
    Right,
}

/// A relationship box as written, before the chain binds its endpoints.
struct RelBox {
    kind: String,
    properties: PropertyMap,
    unique: bool,
    unique_key: Option<String>,
}

/// A relationship materialized by a hop, held back until the chain's trailing
/// property map (if any) has been folded in.
struct PendingRel {
    start: Node,
    rel: Relationship,
    end: Node,
}

/// Streaming reader producing one [`Subgraph`] per boundary-delimited section
/// of the input.
pub struct GraphReader<I: Iterator<Item = char>> {
    scanner: Scanner<I>,
}

impl<'a> GraphReader<std::str::Chars<'a>> {
    #[must_use]
    pub fn from_text(input: &'a str) -> Self {
        Self::new(input.chars())
    }
}

impl<I: Iterator<Item = char>> GraphReader<I> {
    pub fn new(source: I) -> Self {
        Self {
            scanner: Scanner::new(source),
        }
    }

    /// Whether any input remains, whitespace included.
    pub fn has_more(&mut self) -> bool {
        self.scanner.has_more()
    }

    /// Parse one subgraph, consuming its boundary marker if present. The
    /// first grammar violation aborts the subgraph; nothing partial is
    /// returned.
    pub fn read_subgraph(&mut self) -> Result<Subgraph, ParseError> {
        let mut subgraph = Subgraph::new();
        let mut end_of_subgraph = false;
        self.skip_whitespace()?;
        while self.scanner.has_more() && !end_of_subgraph {
            match self.scanner.peek() {
                Some('(') => self.read_chain_into(&mut subgraph)?,
                Some(':') => self.read_hook_into(&mut subgraph)?,
                Some('/') => {
                    let comment = self.read_comment()?;
                    subgraph.add_comment(comment);
                }
                Some('~') => {
                    self.read_boundary()?;
                    end_of_subgraph = true;
                }
                Some(ch) => {
                    return Err(self.scanner.error(format!("Unexpected character {ch}")));
                }
                None => {}
            }
            self.skip_whitespace()?;
        }
        debug!(order = subgraph.order(), size = subgraph.size(), "read subgraph");
        Ok(subgraph)
    }

    /// Chain statement: a node, zero or more arrow-box-arrow-node hops, and
    /// an optional trailing property map.
    fn read_chain_into(&mut self, subgraph: &mut Subgraph) -> Result<(), ParseError> {
        let mut node = self.read_node()?;
        let mut pending: Vec<PendingRel> = Vec::new();
        self.skip_whitespace()?;
        while self.scanner.next_is('<') || self.scanner.next_is('-') {
            let arrow_in = self.read_arrow()?;
            self.skip_whitespace()?;
            let rel_box = self.read_relationship_box()?;
            self.skip_whitespace()?;
            let arrow_out = self.read_arrow()?;
            if arrow_in == Arrow::Plain && arrow_out == Arrow::Plain {
                return Err(self.scanner.error("Lack of direction"));
            }
            self.skip_whitespace()?;
            let other = self.read_node()?;
            if arrow_in == Arrow::Left {
                pending.push(PendingRel {
                    start: other.clone(),
                    rel: rel_from_box(&rel_box, &other, &node),
                    end: node.clone(),
                });
            }
            if arrow_out == Arrow::Right {
                pending.push(PendingRel {
                    start: node.clone(),
                    rel: rel_from_box(&rel_box, &node, &other),
                    end: other.clone(),
                });
            }
            node = other;
            self.skip_whitespace()?;
        }
        let trailing = if self.scanner.next_is('{') {
            Some(self.read_property_map()?)
        } else {
            None
        };
        if pending.is_empty() {
            if let Some(properties) = &trailing {
                node.merge_properties(properties);
            }
            subgraph.merge_node(node);
        } else {
            for mut hop in pending {
                if let Some(properties) = &trailing {
                    hop.rel.merge_properties(properties);
                }
                subgraph.add_relationship(hop.start, hop.rel, hop.end);
            }
        }
        Ok(())
    }

    /// Hook statement: `:label=>node` or `:label:key=>node`. The node is
    /// merged first; the descriptor then lands on the merged result,
    /// overwriting any prior one.
    fn read_hook_into(&mut self, subgraph: &mut Subgraph) -> Result<(), ParseError> {
        self.expect(':')?;
        self.skip_whitespace()?;
        let label = self.read_name()?;
        self.skip_whitespace()?;
        let mut key = None;
        if self.scanner.next_is(':') {
            self.scanner.advance()?;
            self.skip_whitespace()?;
            key = Some(self.read_name()?);
            self.skip_whitespace()?;
        }
        self.expect('=')?;
        self.expect('>')?;
        let node = self.read_node()?;
        let id = subgraph.merge_node(node);
        subgraph.set_node_unique(id, &label, key.as_deref());
        Ok(())
    }

    /// Node body: `()`, `(:Label...)`, `({...})`, or `(name:Label... {...})`.
    fn read_node(&mut self) -> Result<Node, ParseError> {
        self.expect('(')?;
        self.skip_whitespace()?;
        let mut labels = BTreeSet::new();
        let mut unique = (None, None);
        let mut properties = PropertyMap::new();
        let name: Option<String>;
        if self.scanner.next_is(')') {
            name = None;
        } else if self.scanner.next_is(':') {
            name = None;
            unique = self.read_labels_into(&mut labels)?;
            if self.scanner.next_is('{') {
                properties = self.read_property_map()?;
            }
        } else if self.scanner.next_is('{') {
            name = None;
            properties = self.read_property_map()?;
        } else {
            name = Some(self.read_name()?);
            self.skip_whitespace()?;
            if self.scanner.next_is(':') {
                unique = self.read_labels_into(&mut labels)?;
            }
            if self.scanner.next_is('{') {
                properties = self.read_property_map()?;
            }
        }
        self.skip_whitespace()?;
        self.expect(')')?;
        let mut node = Node::new(name.as_deref());
        node.merge_labels(labels);
        node.merge_properties(&properties);
        node.set_unique(unique.0.as_deref(), unique.1.as_deref());
        Ok(node)
    }

    /// One or more `:label` segments, each optionally tagged `!key` to mark
    /// the node's uniqueness descriptor. The grammar lets a later tag win.
    /// Trailing whitespace after each segment is consumed.
    fn read_labels_into(
        &mut self,
        labels: &mut BTreeSet<String>,
    ) -> Result<(Option<String>, Option<String>), ParseError> {
        let mut unique = (None, None);
        while self.scanner.next_is(':') {
            self.scanner.advance()?;
            let label = self.read_name()?;
            labels.insert(label.clone());
            if self.scanner.next_is('!') {
                self.scanner.advance()?;
                unique = (Some(label), Some(self.read_name()?));
            }
            self.skip_whitespace()?;
        }
        Ok(unique)
    }

    /// Relationship box: `[:TYPE]` with optional legacy name slot
    /// (`[:name:TYPE]`, discarded), `!` uniqueness marker with optional
    /// contiguous key, and property map.
    fn read_relationship_box(&mut self) -> Result<RelBox, ParseError> {
        self.expect('[')?;
        self.skip_whitespace()?;
        self.expect(':')?;
        let mut kind = self.read_name()?;
        if self.scanner.next_is(':') {
            // What was read so far was the legacy relationship name slot;
            // accepted for input compatibility, never surfaced in the model.
            self.scanner.advance()?;
            kind = self.read_name()?;
        }
        let mut unique = false;
        let mut unique_key = None;
        if self.scanner.next_is('!') {
            self.scanner.advance()?;
            unique = true;
            if let Some(ch) = self.scanner.peek() {
                if !ch.is_whitespace() && ch != ']' && ch != '{' {
                    unique_key = Some(self.read_name()?);
                }
            }
        }
        self.skip_whitespace()?;
        let mut properties = PropertyMap::new();
        if self.scanner.next_is('{') {
            properties = self.read_property_map()?;
            self.skip_whitespace()?;
        }
        self.expect(']')?;
        Ok(RelBox {
            kind,
            properties,
            unique,
            unique_key,
        })
    }

    fn read_arrow(&mut self) -> Result<Arrow, ParseError> {
        if self.scanner.next_is('<') {
            self.scanner.advance()?;
            self.expect('-')?;
            Ok(Arrow::Left)
        } else if self.scanner.next_is('-') {
            self.scanner.advance()?;
            if self.scanner.next_is('>') {
                self.scanner.advance()?;
                Ok(Arrow::Right)
            } else {
                Ok(Arrow::Plain)
            }
        } else {
            Err(self.scanner.error("Broken arrow"))
        }
    }

    /// `/* ... */`, content trimmed. Running off the end of input without a
    /// closing `*/` is a structural error.
    fn read_comment(&mut self) -> Result<String, ParseError> {
        self.expect('/')?;
        self.expect('*')?;
        let mut text = String::new();
        loop {
            if !self.scanner.has_more() {
                return Err(self.scanner.error("Unterminated comment"));
            }
            let ch = self.scanner.advance()?;
            if ch == '*' && self.scanner.next_is('/') {
                self.scanner.advance()?;
                break;
            }
            text.push(ch);
        }
        Ok(text.trim().to_string())
    }

    /// Four or more `~` characters.
    fn read_boundary(&mut self) -> Result<(), ParseError> {
        for _ in 0..4 {
            self.expect('~')?;
        }
        while self.scanner.next_is('~') {
            self.scanner.advance()?;
        }
        Ok(())
    }

    /// `{ key: value, ... }`.
    fn read_property_map(&mut self) -> Result<PropertyMap, ParseError> {
        let mut properties = PropertyMap::new();
        self.expect('{')?;
        self.skip_whitespace()?;
        if !self.scanner.next_is('}') {
            self.read_pair_into(&mut properties)?;
            self.skip_whitespace()?;
            while self.scanner.next_is(',') {
                self.scanner.advance()?;
                self.skip_whitespace()?;
                self.read_pair_into(&mut properties)?;
                self.skip_whitespace()?;
            }
        }
        self.expect('}')?;
        Ok(properties)
    }

    fn read_pair_into(&mut self, properties: &mut PropertyMap) -> Result<(), ParseError> {
        let key = self.read_name()?;
        self.skip_whitespace()?;
        self.expect(':')?;
        self.skip_whitespace()?;
        let value = self.read_value()?;
        properties.insert(key, value);
        Ok(())
    }

    /// One JSON-compatible value: string, number, boolean, null, or array.
    fn read_value(&mut self) -> Result<Value, ParseError> {
        match self.scanner.peek() {
            Some('[') => Ok(Value::Array(self.read_array()?)),
            Some('"') => Ok(Value::Text(self.read_string()?)),
            Some(ch) if ch == '-' || ch.is_ascii_digit() => self.read_number(),
            Some('t' | 'f') => Ok(Value::Boolean(self.read_boolean()?)),
            Some('n') => {
                self.expect_literal("null")?;
                Ok(Value::Null)
            }
            _ => Err(self.scanner.error("Unexpected character")),
        }
    }

    /// Homogeneous array. The first element fixes the kind; a later element
    /// of another kind is a grammar error. Numeric arrays stay integer only
    /// while every element parsed as an integer.
    fn read_array(&mut self) -> Result<ArrayValue, ParseError> {
        self.expect('[')?;
        self.skip_whitespace()?;
        if self.scanner.next_is(']') {
            self.scanner.advance()?;
            return Ok(ArrayValue::Empty);
        }
        match self.scanner.peek() {
            Some('"') => {
                let mut items = vec![self.read_string()?];
                self.skip_whitespace()?;
                while self.scanner.next_is(',') {
                    self.scanner.advance()?;
                    self.skip_whitespace()?;
                    if !self.scanner.next_is('"') {
                        return Err(self.scanner.error("Disarray"));
                    }
                    items.push(self.read_string()?);
                    self.skip_whitespace()?;
                }
                self.expect(']')?;
                Ok(ArrayValue::Text(items))
            }
            Some(ch) if ch == '-' || ch.is_ascii_digit() => {
                let mut integers = Vec::new();
                let mut reals = Vec::new();
                let mut all_integers = true;
                loop {
                    match self.read_number()? {
                        Value::Integer(number) => {
                            integers.push(number);
                            reals.push(number as f64);
                        }
                        Value::Real(number) => {
                            reals.push(number);
                            all_integers = false;
                        }
                        _ => unreachable!("read_number yields integers and reals only"),
                    }
                    self.skip_whitespace()?;
                    if !self.scanner.next_is(',') {
                        break;
                    }
                    self.scanner.advance()?;
                    self.skip_whitespace()?;
                    let next = self.scanner.peek();
                    if !next.is_some_and(|ch| ch == '-' || ch.is_ascii_digit()) {
                        return Err(self.scanner.error("Disarray"));
                    }
                }
                self.expect(']')?;
                if all_integers {
                    Ok(ArrayValue::Integer(integers))
                } else {
                    Ok(ArrayValue::Real(reals))
                }
            }
            Some('t' | 'f') => {
                let mut items = vec![self.read_boolean()?];
                self.skip_whitespace()?;
                while self.scanner.next_is(',') {
                    self.scanner.advance()?;
                    self.skip_whitespace()?;
                    if !matches!(self.scanner.peek(), Some('t' | 'f')) {
                        return Err(self.scanner.error("Disarray"));
                    }
                    items.push(self.read_boolean()?);
                    self.skip_whitespace()?;
                }
                self.expect(']')?;
                Ok(ArrayValue::Boolean(items))
            }
            _ => Err(self.scanner.error("Disarray")),
        }
    }

    /// A bare identifier (letters, digits, underscore) or a quoted string.
    fn read_name(&mut self) -> Result<String, ParseError> {
        if self.scanner.next_is('"') {
            return self.read_string();
        }
        let mut name = String::new();
        while self
            .scanner
            .peek()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
        {
            name.push(self.scanner.advance()?);
        }
        Ok(name)
    }

    /// A double-quoted JSON string. The raw token, quotes included, goes
    /// through the JSON decoder; a decode failure (including an unterminated
    /// string) is reported at the opening quote.
    fn read_string(&mut self) -> Result<String, ParseError> {
        let line = self.scanner.line();
        let column = self.scanner.column().saturating_sub(1);
        let mut raw = String::new();
        raw.push(self.scanner.advance()?);
        while self.scanner.has_more() {
            let ch = self.scanner.advance()?;
            raw.push(ch);
            if ch == '\\' {
                if self.scanner.has_more() {
                    raw.push(self.scanner.advance()?);
                }
            } else if ch == '"' {
                break;
            }
        }
        serde_json::from_str(&raw)
            .map_err(|_| ParseError::syntax("Unable to parse JSON string", line, column))
    }

    /// Optional `-`, digit run, optional fraction, optional exponent. The
    /// value is an integer iff neither fraction nor exponent appeared.
    fn read_number(&mut self) -> Result<Value, ParseError> {
        let mut digits = String::new();
        let mut is_real = false;
        if self.scanner.next_is('-') {
            digits.push(self.scanner.advance()?);
        }
        while self.scanner.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            digits.push(self.scanner.advance()?);
        }
        if self.scanner.next_is('.') {
            is_real = true;
            digits.push(self.scanner.advance()?);
            while self.scanner.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                digits.push(self.scanner.advance()?);
            }
        }
        if matches!(self.scanner.peek(), Some('E' | 'e')) {
            is_real = true;
            digits.push(self.scanner.advance()?);
            if matches!(self.scanner.peek(), Some('+' | '-')) {
                digits.push(self.scanner.advance()?);
            }
            while self.scanner.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                digits.push(self.scanner.advance()?);
            }
        }
        if is_real {
            digits
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| self.scanner.error("Unreadable number"))
        } else {
            digits
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| self.scanner.error("Unreadable number"))
        }
    }

    fn read_boolean(&mut self) -> Result<bool, ParseError> {
        if self.scanner.next_is('t') {
            self.expect_literal("true")?;
            Ok(true)
        } else if self.scanner.next_is('f') {
            self.expect_literal("false")?;
            Ok(false)
        } else {
            Err(self.scanner.error("Cannot establish truth"))
        }
    }

    fn expect_literal(&mut self, literal: &str) -> Result<(), ParseError> {
        for ch in literal.chars() {
            self.expect(ch)?;
        }
        Ok(())
    }

    fn expect(&mut self, ch: char) -> Result<char, ParseError> {
        if self.scanner.next_is(ch) {
            self.scanner.advance()
        } else {
            Err(self.scanner.error("Unexpected character"))
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), ParseError> {
        while self.scanner.peek().is_some_and(char::is_whitespace) {
            let ch = self.scanner.advance()?;
            if ch == '\n' {
                self.scanner.mark_newline();
            }
        }
        Ok(())
    }
}

fn rel_from_box(rel_box: &RelBox, start: &Node, end: &Node) -> Relationship {
    let mut rel = Relationship::new(start.name(), rel_box.kind.clone(), end.name());
    rel.merge_properties(&rel_box.properties);
    if rel_box.unique {
        rel.set_unique(rel_box.unique_key.clone());
    }
    rel
}
