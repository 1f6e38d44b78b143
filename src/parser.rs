//! A grammar-driven parser over token streams.
//!
//! The [`Parser`] owns the token stream and the symbol table of one source unit and
//! borrows a validated [`GrammarSpec`]. It is split into the following parts.
//!
//! - [`candidates`]: enumerates the productions that can start at the cursor and
//!   tries them transactionally, keeping the one that fills the most components.
//! - [`structure`]: parses one production component by component.
//! - [`expr`]: the operator-precedence engine used for expression slots.
//! - [`effects`]: the declarations made by a matched statement.
//! - [`paths`]: dotted component paths into parsed items.
//!
//! Type resolution of finished expressions lives in [`crate::typeck`].

use std::{collections::BTreeMap, rc::Rc};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    ast::{instance::Node, Ast},
    context::{ParsingContext, ScopeId},
    error::{ErrorKind, ParseError},
    grammar::{filter::StructureFilter, GrammarSpec},
    lexer::{
        token::{Token, TokenKind},
        LexError, Lexer, Tokenize,
    },
};

use self::{expr::Bound, stream::TokenStream};

pub mod candidates;
pub mod effects;
pub mod expr;
pub mod paths;
pub mod stream;
pub mod structure;

/// The error produced when a source unit cannot be turned into an [`Ast`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source could not be tokenized.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// The tokens do not form a program of the grammar.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Tokenizes and parses `source` with the default [`Lexer`] for `grammar`.
pub fn parse_source(grammar: &GrammarSpec, source: &str) -> Result<Ast, SourceError> {
    let lexer = Lexer::for_grammar(grammar);
    let tokens = lexer.tokenize(source)?;
    Ok(Parser::new(grammar, &lexer, tokens).parse()?)
}

/// The parsing state of one source unit.
pub struct Parser<'g> {
    /// The grammar being parsed.
    grammar: &'g GrammarSpec,
    /// Re-tokenizes production literals.
    tokenizer: &'g dyn Tokenize,
    /// The shared cursor.
    stream: TokenStream,
    /// The symbol table, journaled across speculative attempts.
    context: ParsingContext,
    /// Tokenized production literals, by literal text.
    literals: BTreeMap<String, Rc<[Token]>>,
}

impl<'g> Parser<'g> {
    /// Constructs a parser over `tokens` with an empty symbol table.
    pub fn new(grammar: &'g GrammarSpec, tokenizer: &'g dyn Tokenize, tokens: Vec<Token>) -> Self {
        Self {
            grammar,
            tokenizer,
            stream: TokenStream::new(tokens),
            context: ParsingContext::new(),
            literals: BTreeMap::new(),
        }
    }

    /// Replaces the initial symbol table, e.g. to pre-declare symbols.
    pub fn with_context(mut self, context: ParsingContext) -> Self {
        self.context = context;
        self
    }

    /// Parses every statement of the source unit.
    #[instrument(skip_all)]
    pub fn parse(mut self) -> Result<Ast, ParseError> {
        let nodes = self.statements(ScopeId::ROOT, None, &StructureFilter::all())?;
        debug!(statements = nodes.len(), "parsed source unit");
        Ok(Ast::new(nodes, self.context))
    }

    /// Parses statements in `scope` until the token `until` or the end of the stream.
    ///
    /// Stray expression separators between statements are skipped, and the
    /// terminator itself is left unconsumed.
    fn statements(
        &mut self,
        scope: ScopeId,
        until: Option<&str>,
        filter: &StructureFilter,
    ) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();

        loop {
            match self.stream.peek() {
                None => break,
                Some(token) if until == Some(token.text.as_str()) => break,
                Some(token) if token.kind == TokenKind::ExpressionSeparator => {
                    self.stream.advance();
                    continue;
                }
                Some(_) => {}
            }

            let node = self.statement(scope, until, filter)?;
            if let Node::Instance(instance) = &node {
                self.apply_effects(instance, scope)?;
            }
            nodes.push(node);

            // only the outermost statement list runs without an enclosing attempt
            if scope == ScopeId::ROOT && until.is_none() {
                self.context.settle();
            }
        }

        Ok(nodes)
    }

    /// Parses one statement: the structural candidate filling the most components,
    /// or a bare expression where `filter` allows one.
    #[instrument(skip_all, fields(at = ?self.stream.location()))]
    fn statement(
        &mut self,
        scope: ScopeId,
        until: Option<&str>,
        filter: &StructureFilter,
    ) -> Result<Node, ParseError> {
        let candidates = self.candidates(scope, filter, false)?;
        debug!(count = candidates.len(), "statement candidates");

        if candidates.is_empty() && !filter.allows_expressions() {
            let found = self.describe_next();
            return Err(ParseError::new(
                ErrorKind::CandidatesExhausted,
                format!("no structure can start with {found}"),
            )
            .located(self.stream.location()));
        }

        let mut trials = Vec::new();
        let mut failures = Vec::new();

        for candidate in candidates {
            let name = candidate.name.clone();
            match self.attempt(|parser| parser.structure(candidate, scope, &[], Default::default())) {
                Ok(trial) => trials.push((trial.value.components.len(), trial.map(Node::from))),
                Err(err) => {
                    let kind = err.kind;
                    failures.push(err.wrap(kind, format!("`{name}` does not match")));
                }
            }
        }

        if filter.allows_expressions() {
            let bound = Bound::Full {
                until: until.map(String::from),
                lenient: false,
            };
            match self.attempt(|parser| parser.expression(scope, &bound)) {
                Ok(trial) => trials.push((1, trial)),
                Err(err) => failures.push(err),
            }
        }

        match Self::best(trials) {
            Some(trial) => Ok(self.commit(trial)),
            None => Err(ParseError::exhausted(
                failures,
                self.stream.location(),
                "no structure matches this statement",
            )),
        }
    }

    /// Describes the next token for diagnostics.
    fn describe_next(&self) -> String {
        match self.stream.peek() {
            Some(token) => format!("`{}`", token.text),
            None => "the end of input".to_string(),
        }
    }

    /// Returns the error for a production that ran out of tokens.
    fn end_of_input(&self, expected: &str) -> ParseError {
        ParseError::new(
            ErrorKind::UnmatchedLiteral,
            format!("unexpected end of input, expected {expected}"),
        )
        .located(self.stream.location())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::grammar::{fixtures, types::TypeSpec};

    /// Parses `source` with `grammar` and renders every statement.
    pub(crate) fn render(grammar: &GrammarSpec, source: &str) -> Vec<String> {
        match parse_source(grammar, source) {
            Ok(ast) => ast.nodes().iter().map(ToString::to_string).collect(),
            Err(SourceError::Parse(err)) => panic!("{}", err.traceback()),
            Err(err) => panic!("{err}"),
        }
    }

    /// Parses `source` with `grammar`, expecting a parse failure.
    pub(crate) fn failure(grammar: &GrammarSpec, source: &str) -> ParseError {
        match parse_source(grammar, source) {
            Err(SourceError::Parse(err)) => {
                println!("{}", err.traceback());
                err
            }
            Err(err) => panic!("unexpected lexer failure {err}"),
            Ok(ast) => panic!("unexpectedly parsed {ast}"),
        }
    }

    #[test]
    fn check_declarations() {
        let grammar = fixtures::standard();
        let ast = parse_source(&grammar, "int x = 5; float y = 2.5; bool b = true;").unwrap();

        assert_eq!(
            ast.globals()
                .map(|(name, ty)| format!("{name}: {ty}"))
                .collect::<Vec<_>>(),
            vec!["b: bool", "x: int", "y: float"]
        );
        assert_eq!(ast.nodes()[0].to_string(), "(var_decl int x 5)");
        // settled statements leave nothing to roll back
        assert_eq!(ast.context().checkpoint(), ParsingContext::new().checkpoint());
    }

    #[test]
    fn check_field_declaration_loses_to_longer_candidate() {
        let grammar = fixtures::standard();
        assert_eq!(
            render(&grammar, "int x; int y = 3;"),
            vec!["(field_decl int x)", "(var_decl int y 3)"]
        );
    }

    #[test]
    fn check_stray_separators_are_skipped() {
        let grammar = fixtures::standard();
        assert_eq!(render(&grammar, ";; int x = 1;;; x = 2"), vec![
            "(var_decl int x 1)",
            "(assignment x 2)"
        ]);
        assert!(render(&grammar, ";;").is_empty());
    }

    #[test]
    fn check_duplicate_declaration() {
        let grammar = fixtures::standard();
        let err = failure(&grammar, "int x = 1; int x = 2;");
        assert!(err.contains(ErrorKind::DuplicateDeclaration));
        assert_eq!(err.kind, ErrorKind::CandidatesExhausted);
        assert!(!err.candidates.is_empty());
    }

    #[test]
    fn check_undeclared_name() {
        let grammar = fixtures::standard();
        let err = failure(&grammar, "y = 2;");
        assert_eq!(err.kind, ErrorKind::UndeclaredName);
        assert_eq!(err.location.map(|l| (l.line, l.column)), Some((1, 1)));
    }

    #[test]
    fn check_type_mismatch_in_declaration() {
        let grammar = fixtures::standard();
        let err = failure(&grammar, "float x = 1;");
        assert_eq!(err.kind, ErrorKind::InvalidType);
    }

    #[test]
    fn check_blocks_open_scopes() {
        let grammar = fixtures::standard();
        let ast = parse_source(&grammar, "int x = 1; if (x > 0) { int y = x; y = 2; }").unwrap();

        assert_eq!(
            ast.nodes()[1].to_string(),
            "(if (> x 0) (block [(var_decl int y x) (assignment y 2)]))"
        );
        // `y` lives in the block scope only
        assert!(ast.context().lookup(ScopeId::ROOT, "y").is_none());
        let block = ast
            .context()
            .scopes()
            .find(|scope| ast.context().has_local(*scope, "y"))
            .unwrap();
        assert_eq!(ast.context().parent(block), Some(ScopeId::ROOT));

        let err = failure(&grammar, "if (true) { int y = 1; } y = 2;");
        assert_eq!(err.kind, ErrorKind::UndeclaredName);
    }

    #[test]
    fn check_failed_candidates_leave_no_symbols() {
        let grammar = fixtures::standard();
        // the block of the failing `if` declares `z` before failing on `?`
        let err = failure(&grammar, "if (true) { int z = 1; ? }");
        assert!(err.contains(ErrorKind::UnresolvableExpression));

        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer
            .tokenize("int a = 1; if (a > 0) { int q = a; } int b = a;")
            .unwrap();
        let ast = Parser::new(&grammar, &lexer, tokens).parse().unwrap();
        // only the scopes and symbols of the winning candidates survive
        assert_eq!(ast.context().scopes().count(), 2);
        assert_eq!(ast.globals().map(|(name, _)| name).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn check_predeclared_context() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("n = n + 1;").unwrap();

        let mut context = ParsingContext::new();
        context.declare(ScopeId::ROOT, "n", TypeSpec::named("int"));

        let ast = Parser::new(&grammar, &lexer, tokens)
            .with_context(context)
            .parse()
            .unwrap();
        assert_eq!(ast.to_string(), "(assignment n (+ n 1))\n");
    }

    #[test]
    fn check_lexer_errors_surface() {
        let grammar = fixtures::standard();
        assert!(matches!(
            parse_source(&grammar, "int x = \"oops;"),
            Err(SourceError::Lex(LexError::UnterminatedString { .. }))
        ));
    }
}
