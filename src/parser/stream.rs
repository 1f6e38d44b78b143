//! A rewindable cursor over a token buffer.

use crate::{error::Location, lexer::token::Token};

/// The token stream shared by every part of the parser.
///
/// The cursor is a plain index, so speculative attempts save it with
/// [`TokenStream::position`] and restore it with [`TokenStream::goto`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStream {
    /// The tokens of the source unit.
    tokens: Vec<Token>,
    /// The index of the next unconsumed token.
    position: usize,
}

impl TokenStream {
    /// Constructs a stream positioned at the first of `tokens`.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Returns the next unconsumed token.
    #[inline(always)]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Returns the token `offset` places after the next unconsumed one.
    #[inline(always)]
    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Skips the next token.
    #[inline(always)]
    pub fn advance(&mut self) {
        self.position = (self.position + 1).min(self.tokens.len());
    }

    /// Returns the cursor.
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor to `position`.
    #[inline(always)]
    pub fn goto(&mut self, position: usize) {
        self.position = position.min(self.tokens.len());
    }

    /// Returns `true` once every token has been consumed.
    #[inline(always)]
    pub fn is_done(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Returns the location of the next token, or of the last token at the end of
    /// the stream.
    pub fn location(&self) -> Option<Location> {
        self.peek().or_else(|| self.tokens.last()).map(Location::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::TokenKind;

    #[test]
    fn check_cursor_movement() {
        let mut stream = TokenStream::new(vec![
            Token::new(TokenKind::Identifier, "a", 1, 1),
            Token::new(TokenKind::Operator, "+", 1, 3),
        ]);

        assert_eq!(stream.peek().map(|t| t.text.as_str()), Some("a"));
        assert_eq!(stream.peek_at(1).map(|t| t.text.as_str()), Some("+"));
        let saved = stream.position();

        assert_eq!(stream.next_token().map(|t| t.text), Some("a".to_string()));
        stream.advance();
        assert!(stream.is_done());
        assert_eq!(stream.next_token(), None);
        assert_eq!(stream.location(), Some(Location { line: 1, column: 3 }));

        stream.goto(saved);
        assert_eq!(stream.position(), 0);
        assert!(!stream.is_done());
    }
}
