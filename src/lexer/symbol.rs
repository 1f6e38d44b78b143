//! Parsers for punctuation: brackets, separators, operators and string literals.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{anychar, char, one_of},
    combinator::recognize,
    error::{ErrorKind, ParseError, VerboseError},
    multi::many0_count,
    sequence::{pair, tuple},
    Parser,
};

use super::{token::TokenKind, LexResult, Lexeme};

/// The characters that always form a token of their own.
const SINGLETONS: &str = "(){}[],";

/// Returns `true` if `c` may appear inside an operator token.
#[inline(always)]
fn is_operator_char(c: char) -> bool {
    c.is_ascii_punctuation() && c != '"' && !SINGLETONS.contains(c)
}

/// Parses a single bracket from `input`.
pub fn bracket(input: &str) -> LexResult<'_> {
    recognize(one_of("(){}[]")).parse(input).map(|(tail, text)| {
        let kind = match text {
            "(" => TokenKind::LeftParen,
            ")" => TokenKind::RightParen,
            "{" => TokenKind::LeftBrace,
            "}" => TokenKind::RightBrace,
            "[" => TokenKind::LeftBracket,
            _ => TokenKind::RightBracket,
        };
        (tail, Lexeme { kind, text })
    })
}

/// Parses a `,`, which is always an operator of its own.
pub fn comma(input: &str) -> LexResult<'_> {
    recognize(char(',')).parse(input).map(|(tail, text)| {
        (
            tail,
            Lexeme {
                kind: TokenKind::Operator,
                text,
            },
        )
    })
}

/// Parses a double-quoted string literal with backslash escapes from `input`.
///
/// The quotes are kept in the token text.
pub fn string(input: &str) -> LexResult<'_> {
    recognize(tuple((
        char('"'),
        many0_count(alt((is_not("\"\\"), recognize(pair(char('\\'), anychar))))),
        char('"'),
    )))
    .parse(input)
    .map(|(tail, text)| {
        (
            tail,
            Lexeme {
                kind: TokenKind::String,
                text,
            },
        )
    })
}

/// Parses one of the given expression `separators` from `input`.
///
/// Longer separators are tried first, so `;;` wins over `;` when both are declared.
pub fn separator<'src>(input: &'src str, separators: &[String]) -> LexResult<'src> {
    let mut sorted: Vec<&String> = separators.iter().collect();
    sorted.sort_by_key(|sep| std::cmp::Reverse(sep.len()));

    for sep in sorted {
        if let Ok((tail, text)) = tag::<_, _, VerboseError<&str>>(sep.as_str()).parse(input) {
            return Ok((
                tail,
                Lexeme {
                    kind: TokenKind::ExpressionSeparator,
                    text,
                },
            ));
        }
    }

    Err(nom::Err::Error(VerboseError::from_error_kind(
        input,
        ErrorKind::Tag,
    )))
}

/// Parses the longest run of operator characters from `input`, stopping before any
/// of the given `separators`.
pub fn operator<'src>(input: &'src str, separators: &[String]) -> LexResult<'src> {
    let mut end = 0;
    for (index, c) in input.char_indices() {
        let rest = &input[index..];
        if !is_operator_char(c) || separators.iter().any(|sep| rest.starts_with(sep.as_str())) {
            break;
        }
        end = index + c.len_utf8();
    }

    match end {
        0 => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::TakeWhile1,
        ))),
        _ => Ok((
            &input[end..],
            Lexeme {
                kind: TokenKind::Operator,
                text: &input[..end],
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semicolon() -> Vec<String> {
        vec![";".to_string()]
    }

    #[test]
    fn bracket_parser_is_correct() {
        assert!(bracket("(5").is_ok_and(|(tail, lexeme)| tail == "5" && lexeme.kind == TokenKind::LeftParen));
        assert!(bracket("}").is_ok_and(|(_, lexeme)| lexeme.kind == TokenKind::RightBrace));
        assert!(bracket("+").is_err());
    }

    #[test]
    fn string_parser_is_correct() {
        assert!(string(r#""hi \"there\"" tail"#)
            .is_ok_and(|(tail, lexeme)| tail == " tail" && lexeme.text == r#""hi \"there\"""#));
        assert!(string(r#""""#).is_ok_and(|(tail, _)| tail.is_empty()));
        assert!(string(r#""unterminated"#).is_err());
    }

    #[test]
    fn operator_parser_is_correct() {
        assert!(operator("++ 4", &semicolon()).is_ok_and(|(tail, lexeme)| tail == " 4" && lexeme.text == "++"));
        assert!(operator("+;", &semicolon()).is_ok_and(|(tail, lexeme)| tail == ";" && lexeme.text == "+"));
        assert!(operator("-(", &semicolon()).is_ok_and(|(tail, lexeme)| tail == "(" && lexeme.text == "-"));
        assert!(operator(",", &semicolon()).is_err());
        assert!(operator(";", &semicolon()).is_err());
    }

    #[test]
    fn separator_parser_is_correct() {
        let separators = vec![";".to_string(), ";;".to_string()];
        assert!(separator(";; x", &separators).is_ok_and(|(tail, lexeme)| tail == " x" && lexeme.text == ";;"));
        assert!(separator("+", &separators).is_err());
    }
}
