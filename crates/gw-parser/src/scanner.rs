//! Character source with one-character lookahead and position bookkeeping.

use gw_core::ParseError;

/// Streaming cursor over a character source. Holds at most one pushed-back
/// character, so memory use stays constant regardless of input size.
///
/// The column counter advances every time a character is pulled from the
/// underlying source, whether that pull came from a peek or a read; consuming
/// an already-peeked character does not advance it again. Reaching the end of
/// input is cached too, so repeated peeks at the end stay cheap and do not
/// drift the column. Reported error columns are one behind the counter, which
/// lands them on the offending character.
pub struct Scanner<I: Iterator<Item = char>> {
    source: I,
    peeked: Option<Option<char>>,
    line: usize,
    column: usize,
}

impl<I: Iterator<Item = char>> Scanner<I> {
    pub fn new(source: I) -> Self {
        Self {
            source,
            peeked: None,
            line: 0,
            column: 0,
        }
    }

    /// Next character without consuming it, `None` at end of input.
    pub fn peek(&mut self) -> Option<char> {
        if let Some(cached) = self.peeked {
            return cached;
        }
        self.column += 1;
        let next = self.source.next();
        self.peeked = Some(next);
        next
    }

    /// Consume one character. Calling this at end of input is a violation of
    /// the read contract (callers check [`Scanner::has_more`] first) and
    /// surfaces as the non-positional error variant.
    pub fn advance(&mut self) -> Result<char, ParseError> {
        let next = match self.peeked.take() {
            Some(cached) => cached,
            None => {
                self.column += 1;
                self.source.next()
            }
        };
        next.ok_or(ParseError::UnexpectedEnd)
    }

    pub fn has_more(&mut self) -> bool {
        self.peek().is_some()
    }

    pub fn next_is(&mut self, ch: char) -> bool {
        self.peek() == Some(ch)
    }

    /// Record a consumed newline: next line, column back to zero.
    pub fn mark_newline(&mut self) {
        self.line += 1;
        self.column = 0;
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// A structural error at the current position.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(message, self.line, self.column.saturating_sub(1))
    }
}
