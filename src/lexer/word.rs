//! Identifiers and other word-like tokens.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1},
    combinator::recognize,
    multi::many0_count,
    sequence::pair,
    Parser,
};

use super::{token::TokenKind, LexResult, Lexeme};

/// Parses a word from `input`: a latin letter or underscore followed by any number of
/// latin letters, arabic numerals and underscores.
///
/// Every word lexes as a [`TokenKind::Identifier`]; the [`Lexer`](super::Lexer)
/// reclassifies the words its grammar reserves.
pub fn word(input: &str) -> LexResult<'_> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
    .map(|(tail, text)| {
        (
            tail,
            Lexeme {
                kind: TokenKind::Identifier,
                text,
            },
        )
    })
}
