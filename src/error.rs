//! The traceback error chain produced while parsing a source unit.
//!
//! Every failure inside the matcher, the expression engine or the type resolver is a
//! [`ParseError`]. Errors raised while a speculative candidate is being tried are
//! collected rather than propagated, so that sibling candidates can be attempted; when
//! no candidate survives, the collected errors are attached to a single
//! [`ErrorKind::CandidatesExhausted`] error as its `candidates`.

use std::fmt::Display;

use thiserror::Error;

use crate::lexer::token::Token;

/// The taxonomy of parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A literal structure component did not match the source.
    UnmatchedLiteral,
    /// A name was used before it was declared.
    UndeclaredName,
    /// A name was declared twice where the grammar forbids it.
    DuplicateDeclaration,
    /// An expression could not be reduced to a single value.
    UnresolvableExpression,
    /// A type was unknown or did not match its declaration.
    InvalidType,
    /// An operator was spliced before all of its fields were parsed.
    IncompleteOperator,
    /// No overload of an operator accepts the types of its operands.
    NoMatchingOverload,
    /// Every candidate production failed.
    CandidatesExhausted,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::UnmatchedLiteral => "unmatched literal",
                Self::UndeclaredName => "undeclared name",
                Self::DuplicateDeclaration => "duplicate declaration",
                Self::UnresolvableExpression => "unresolvable expression",
                Self::InvalidType => "invalid type",
                Self::IncompleteOperator => "incomplete operator",
                Self::NoMatchingOverload => "no matching overload",
                Self::CandidatesExhausted => "candidates exhausted",
            }
        )
    }
}

/// A position in the source, as reported by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// The 1-based line number.
    pub line: usize,
    /// The 1-based column number.
    pub column: usize,
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl From<&Token> for Location {
    fn from(token: &Token) -> Self {
        Self {
            line: token.line,
            column: token.column,
        }
    }
}

/// One link of a parse traceback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ParseError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// A human-readable description of the failure.
    pub message: String,
    /// Where the failure was detected, if a token was available.
    pub location: Option<Location>,
    /// The failure this error wraps.
    #[source]
    pub cause: Option<Box<ParseError>>,
    /// The failures of every candidate tried at this point.
    pub candidates: Vec<ParseError>,
}

impl ParseError {
    /// Constructs a new error of the given `kind` with no location or cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            cause: None,
            candidates: Vec::new(),
        }
    }

    /// Constructs a new error positioned at `token`.
    pub fn at(kind: ErrorKind, token: &Token, message: impl Into<String>) -> Self {
        Self::new(kind, message).located(Some(token.into()))
    }

    /// Sets the location of `self`.
    pub fn located(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Wraps `self` as the cause of a new error.
    pub fn wrap(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        let location = self.location;
        Self {
            kind,
            message: message.into(),
            location,
            cause: Some(Box::new(self)),
            candidates: Vec::new(),
        }
    }

    /// Aggregates the failures of several candidates into one error.
    ///
    /// A single failure is returned as-is, since wrapping it adds nothing.
    pub fn exhausted(
        mut failures: Vec<ParseError>,
        location: Option<Location>,
        message: impl Into<String>,
    ) -> Self {
        if failures.len() == 1 {
            if let Some(only) = failures.pop() {
                return only;
            }
        }

        Self {
            kind: ErrorKind::CandidatesExhausted,
            message: message.into(),
            location,
            cause: None,
            candidates: failures,
        }
    }

    /// Returns the innermost error of this chain.
    pub fn root_cause(&self) -> &ParseError {
        match &self.cause {
            Some(cause) => cause.root_cause(),
            None => self,
        }
    }

    /// Returns `true` if this error or anything it wraps has the given `kind`.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.kind == kind
            || self.cause.as_ref().is_some_and(|cause| cause.contains(kind))
            || self.candidates.iter().any(|error| error.contains(kind))
    }

    /// Renders the full chain, indenting each nested level by two spaces.
    pub fn traceback(&self) -> String {
        let mut buf = String::new();
        self.write_traceback(&mut buf, 0);
        buf
    }

    /// Appends the traceback of `self` at the given `depth` to `buf`.
    fn write_traceback(&self, buf: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.location {
            Some(location) => {
                buf.push_str(&format!("{indent}[{location}] {}: {}\n", self.kind, self.message))
            }
            None => buf.push_str(&format!("{indent}{}: {}\n", self.kind, self.message)),
        }

        for candidate in &self.candidates {
            candidate.write_traceback(buf, depth + 1);
        }

        if let Some(cause) = &self.cause {
            cause.write_traceback(buf, depth + 1);
        }
    }
}

sa::assert_impl_all!(ParseError: Clone, std::error::Error, Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_traceback_indentation() {
        let inner = ParseError::new(ErrorKind::UndeclaredName, "`y` is not declared");
        let outer = inner.wrap(ErrorKind::UnresolvableExpression, "bad operand");
        let all = ParseError::exhausted(
            vec![
                outer,
                ParseError::new(ErrorKind::UnmatchedLiteral, "expected `=`"),
            ],
            Some(Location { line: 1, column: 3 }),
            "no production matches `y`",
        );

        let rendered = all.traceback();
        dbg!(&rendered);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "[1:3] candidates exhausted: no production matches `y`");
        assert_eq!(lines[1], "  unresolvable expression: bad operand");
        assert_eq!(lines[2], "    undeclared name: `y` is not declared");
        assert_eq!(lines[3], "  unmatched literal: expected `=`");
    }

    #[test]
    fn single_failure_is_not_wrapped() {
        let error = ParseError::exhausted(
            vec![ParseError::new(ErrorKind::InvalidType, "unknown type `foo`")],
            None,
            "ignored",
        );
        assert_eq!(error.kind, ErrorKind::InvalidType);
        assert!(error.candidates.is_empty());
    }

    #[test]
    fn check_contains_and_root_cause() {
        let error = ParseError::new(ErrorKind::DuplicateDeclaration, "`x` exists")
            .wrap(ErrorKind::UnmatchedLiteral, "outer");
        assert!(error.contains(ErrorKind::DuplicateDeclaration));
        assert!(!error.contains(ErrorKind::InvalidType));
        assert_eq!(error.root_cause().kind, ErrorKind::DuplicateDeclaration);
        assert!(std::error::Error::source(&error).is_some());
    }
}
