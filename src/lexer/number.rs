//! Integer and floating-point literals.

use nom::{
    character::complete::{char, digit1},
    combinator::{opt, recognize},
    sequence::pair,
    Parser,
};

use super::{token::TokenKind, LexResult, Lexeme};

/// Parses an integer or float literal from `input`.
///
/// A float is a digit sequence followed by a `.` and at least one more digit, so `5.`
/// lexes as the integer `5` followed by whatever comes next.
pub fn number(input: &str) -> LexResult<'_> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))
        .parse(input)
        .map(|(tail, text)| {
            let kind = match text.contains('.') {
                true => TokenKind::Float,
                false => TokenKind::Integer,
            };
            (tail, Lexeme { kind, text })
        })
}
