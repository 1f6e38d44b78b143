//! The [`Token`] type produced by the [`Lexer`](super::Lexer).

use std::fmt::Display;

/// The lexical class of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    /// A name, e.g. `x` or `struct`.
    Identifier,
    /// An integer literal, e.g. `42`.
    Integer,
    /// A floating-point literal, e.g. `6.5`.
    Float,
    /// A double-quoted string literal, quotes included.
    String,
    /// A run of punctuation, e.g. `+`, `++` or `?`.
    Operator,
    /// The name of a primitive type declared by the grammar.
    PrimitiveType,
    /// A literal keyword with a primitive type, e.g. `true`.
    ValueKeyword,
    /// A statement separator declared by the grammar, e.g. `;`.
    ExpressionSeparator,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Identifier => "identifier",
                Self::Integer => "integer",
                Self::Float => "float",
                Self::String => "string",
                Self::Operator => "operator",
                Self::PrimitiveType => "primitive type",
                Self::ValueKeyword => "value keyword",
                Self::ExpressionSeparator => "separator",
                Self::LeftParen | Self::RightParen => "parenthesis",
                Self::LeftBrace | Self::RightBrace => "brace",
                Self::LeftBracket | Self::RightBracket => "bracket",
            }
        )
    }
}

/// A single token of source text, with its position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// The lexical class of this token.
    pub kind: TokenKind,
    /// The exact source text of this token.
    pub text: String,
    /// The 1-based line on which this token starts.
    pub line: usize,
    /// The 1-based column at which this token starts.
    pub column: usize,
}

impl Token {
    /// Constructs a new [`Token`].
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    /// Returns the column immediately after the last character of `self`.
    #[inline(always)]
    pub fn end_column(&self) -> usize {
        self.column + self.text.chars().count()
    }

    /// Returns `true` if `next` starts exactly where `self` ends.
    pub fn is_adjacent_to(&self, next: &Token) -> bool {
        self.line == next.line && self.end_column() == next.column
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_adjacency() {
        let plus = Token::new(TokenKind::Operator, "+", 1, 3);
        let next = Token::new(TokenKind::Operator, "=", 1, 4);
        let spaced = Token::new(TokenKind::Operator, "=", 1, 5);
        let below = Token::new(TokenKind::Operator, "=", 2, 4);

        assert!(plus.is_adjacent_to(&next));
        assert!(!plus.is_adjacent_to(&spaced));
        assert!(!plus.is_adjacent_to(&below));
    }
}
