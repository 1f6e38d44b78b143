//! A grammar-aware lexer for source units.
//!
//! The lexer is deliberately simple: every token is a word, a number, a string, a
//! bracket, a separator or a run of punctuation. The grammar only influences how words
//! and separators are classified (see [`Lexer::for_grammar`]).

use std::collections::BTreeSet;

use nom::{
    branch::alt, character::complete::multispace0, error::VerboseError, IResult, Parser,
};
use thiserror::Error;

use crate::grammar::GrammarSpec;

use self::token::{Token, TokenKind};

pub mod number;
pub mod symbol;
pub mod token;
pub mod word;

/// A classified slice of source text, before it is positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'src> {
    /// The lexical class of this slice.
    pub kind: TokenKind,
    /// The source text of this slice.
    pub text: &'src str,
}

/// The general return type for [`crate::lexer`] parsers.
pub type LexResult<'src> = IResult<&'src str, Lexeme<'src>, VerboseError<&'src str>>;

/// The error type produced when source text cannot be tokenized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    /// A character that cannot begin any token.
    #[error("unexpected character {character:?} at {line}:{column}")]
    UnexpectedCharacter {
        /// The offending character.
        character: char,
        /// The 1-based line of the character.
        line: usize,
        /// The 1-based column of the character.
        column: usize,
    },
    /// A string literal with no closing quote.
    #[error("unterminated string literal starting at {line}:{column}")]
    UnterminatedString {
        /// The 1-based line of the opening quote.
        line: usize,
        /// The 1-based column of the opening quote.
        column: usize,
    },
}

/// Anything that can turn source text into [`Token`]s.
///
/// The parser re-tokenizes the literal components of grammar productions through the
/// same implementation it was given the source tokens from, so that multi-token
/// literals compare token by token.
pub trait Tokenize {
    /// Splits `source` into tokens.
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, LexError>;
}

/// The default [`Tokenize`] implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexer {
    /// Words that lex as [`TokenKind::PrimitiveType`].
    primitives: BTreeSet<String>,
    /// Words that lex as [`TokenKind::ValueKeyword`].
    keywords: BTreeSet<String>,
    /// Texts that lex as [`TokenKind::ExpressionSeparator`].
    separators: Vec<String>,
}

impl Lexer {
    /// Constructs a lexer which reserves no words and knows no separators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a lexer that reserves the primitive type names, value keywords and
    /// expression separators declared by `grammar`.
    pub fn for_grammar(grammar: &GrammarSpec) -> Self {
        Self {
            primitives: grammar.primitive_names().map(String::from).collect(),
            keywords: grammar.value_keywords().map(String::from).collect(),
            separators: grammar.separators().to_vec(),
        }
    }

    /// Parses one unpositioned lexeme from the start of `input`.
    fn lexeme<'src>(&self, input: &'src str) -> LexResult<'src> {
        alt((
            symbol::string,
            number::number,
            word::word,
            symbol::bracket,
            |i: &'src str| symbol::separator(i, &self.separators),
            symbol::comma,
            |i: &'src str| symbol::operator(i, &self.separators),
        ))
        .parse(input)
    }

    /// Refines the kind of a word according to the reserved words of `self`.
    fn classify(&self, lexeme: Lexeme<'_>) -> TokenKind {
        match lexeme.kind {
            TokenKind::Identifier if self.primitives.contains(lexeme.text) => {
                TokenKind::PrimitiveType
            }
            TokenKind::Identifier if self.keywords.contains(lexeme.text) => {
                TokenKind::ValueKeyword
            }
            TokenKind::Identifier if self.separators.iter().any(|sep| sep == lexeme.text) => {
                TokenKind::ExpressionSeparator
            }
            kind => kind,
        }
    }
}

/// Tracks the line and column of the next unconsumed character.
#[derive(Debug, Clone, Copy)]
struct Position {
    /// The current 1-based line.
    line: usize,
    /// The current 1-based column.
    column: usize,
}

impl Position {
    /// Moves past `text`.
    fn advance(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.column = 1;
                }
                _ => self.column += 1,
            }
        }
    }
}

impl Tokenize for Lexer {
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut position = Position { line: 1, column: 1 };
        let mut rest = source;

        loop {
            let (tail, space) =
                multispace0::<_, VerboseError<&str>>(rest).unwrap_or((rest, ""));
            position.advance(space);
            rest = tail;

            if rest.is_empty() {
                break;
            }

            match self.lexeme(rest) {
                Ok((tail, lexeme)) => {
                    tokens.push(Token::new(
                        self.classify(lexeme),
                        lexeme.text,
                        position.line,
                        position.column,
                    ));
                    position.advance(lexeme.text);
                    rest = tail;
                }
                Err(_) if rest.starts_with('"') => {
                    return Err(LexError::UnterminatedString {
                        line: position.line,
                        column: position.column,
                    })
                }
                Err(_) => {
                    return Err(LexError::UnexpectedCharacter {
                        character: rest.chars().next().unwrap_or_default(),
                        line: position.line,
                        column: position.column,
                    })
                }
            }
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer() -> Lexer {
        Lexer {
            primitives: ["int", "float", "bool"].map(String::from).into(),
            keywords: ["true", "false"].map(String::from).into(),
            separators: vec![";".to_string()],
        }
    }

    #[test]
    fn check_small_example_program() {
        let source = r#"
        int x = 5 + 4 * 6.5;
        bool y = x > 3 ? true : false;
        "#;

        let tokens = lexer().tokenize(source).unwrap();
        dbg!(&tokens);

        let kinds: Vec<_> = tokens.iter().take(9).map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::PrimitiveType,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Integer,
                TokenKind::Operator,
                TokenKind::Integer,
                TokenKind::Operator,
                TokenKind::Float,
                TokenKind::ExpressionSeparator,
            ]
        );
        assert!(tokens.iter().any(|token| token.kind == TokenKind::ValueKeyword));
    }

    #[test]
    fn check_token_positions() {
        let tokens = lexer().tokenize("a +\n  (b)").unwrap();
        let positions: Vec<_> = tokens.iter().map(|t| (t.line, t.column)).collect();
        assert_eq!(positions, vec![(1, 1), (1, 3), (2, 3), (2, 4), (2, 5)]);
    }

    #[test]
    fn operators_stop_at_brackets_and_commas() {
        let tokens = lexer().tokenize("f(-1,2)++;").unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["f", "(", "-", "1", ",", "2", ")", "++", ";"]);
    }

    #[test]
    fn check_lex_errors() {
        assert_eq!(
            lexer().tokenize("x = \"open"),
            Err(LexError::UnterminatedString { line: 1, column: 5 })
        );
        assert!(matches!(
            lexer().tokenize("x = é"),
            Err(LexError::UnexpectedCharacter { character: 'é', .. })
        ));
    }
}
