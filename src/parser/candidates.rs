//! Candidate enumeration and transactional trials.
//!
//! Every speculative parse runs inside [`Parser::attempt`], which restores the cursor
//! afterwards and detaches the symbol-table changes of a successful attempt. Only the
//! chosen trial is [committed](Parser::commit), replaying its changes; the others are
//! simply dropped.

use std::rc::Rc;

use tracing::trace;

use crate::{
    context::{Changeset, ScopeId},
    error::{ErrorKind, ParseError},
    grammar::{
        filter::StructureFilter,
        object::StructuredObject,
        structure::{ComponentKind, NamePolicy, StructureComponent},
    },
    lexer::token::{Token, TokenKind},
};

use super::Parser;

/// The outcome of a successful speculative attempt.
#[derive(Debug)]
pub(crate) struct Trial<T> {
    /// What the attempt produced.
    pub(crate) value: T,
    /// The cursor after the attempt.
    end: usize,
    /// The symbol-table changes made by the attempt.
    changes: Changeset,
}

impl<T> Trial<T> {
    /// Maps the value of `self`, keeping its end and changes.
    pub(crate) fn map<U>(self, op: impl FnOnce(T) -> U) -> Trial<U> {
        Trial {
            value: op(self.value),
            end: self.end,
            changes: self.changes,
        }
    }
}

impl<'g> Parser<'g> {
    /// Runs `op` speculatively.
    ///
    /// The cursor is always restored. A failed attempt's symbol-table changes are
    /// rolled back; a successful attempt's are detached into the returned trial.
    pub(crate) fn attempt<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Trial<T>, ParseError> {
        let start = self.stream.position();
        let checkpoint = self.context.checkpoint();

        let result = op(self);
        let end = self.stream.position();
        self.stream.goto(start);

        match result {
            Ok(value) => Ok(Trial {
                value,
                end,
                changes: self.context.detach(checkpoint),
            }),
            Err(err) => {
                self.context.rollback(checkpoint);
                Err(err)
            }
        }
    }

    /// Accepts `trial`: replays its changes and moves the cursor past it.
    pub(crate) fn commit<T>(&mut self, trial: Trial<T>) -> T {
        self.context.replay(trial.changes);
        self.stream.goto(trial.end);
        trial.value
    }

    /// Picks the trial with the highest component count; the earliest wins ties.
    pub(crate) fn best<T>(trials: Vec<(usize, Trial<T>)>) -> Option<Trial<T>> {
        let mut best: Option<(usize, Trial<T>)> = None;
        for (count, trial) in trials {
            if best.as_ref().map_or(true, |(top, _)| count > *top) {
                best = Some((count, trial));
            }
        }
        best.map(|(_, trial)| trial)
    }

    /// Returns the productions allowed by `filter` that can start at the cursor.
    ///
    /// With `operators` set, only operator productions are considered and their
    /// leading expression slots are skipped when a left operand is available, as
    /// expressed by the shapes in `filter`. Otherwise operators are never returned.
    pub(crate) fn candidates(
        &mut self,
        scope: ScopeId,
        filter: &StructureFilter,
        operators: bool,
    ) -> Result<Vec<Rc<StructuredObject>>, ParseError> {
        let grammar = self.grammar;
        let mut candidates = Vec::new();

        for object in grammar.structures() {
            if !filter.allows(object) || object.create_operator.is_some() != operators {
                continue;
            }

            let skip = match operators {
                true => object.shape().is_some_and(|shape| shape.takes_left()),
                false => false,
            };
            let first = match skip {
                true => object.structure.get(object.leading_expressions()),
                false => object.structure.first(),
            };

            if let Some(first) = first {
                if self.can_start(object, first, scope)? {
                    candidates.push(Rc::clone(object));
                }
            }
        }

        Ok(candidates)
    }

    /// Returns `true` if `component` of `object` can match at the cursor.
    fn can_start(
        &mut self,
        object: &StructuredObject,
        component: &StructureComponent,
        scope: ScopeId,
    ) -> Result<bool, ParseError> {
        let variable = match component {
            StructureComponent::Literal(text) => return self.literal_matches(text),
            StructureComponent::Variable(variable) => variable,
        };

        let Some(spec) = object.spec(variable) else {
            return Ok(false);
        };
        let Some(token) = self.stream.peek() else {
            return Ok(false);
        };

        Ok(match &spec.kind {
            ComponentKind::Typename => {
                self.grammar.is_primitive(&token.text)
                    || self
                        .context
                        .lookup(scope, &token.text)
                        .is_some_and(|ty| ty.is_type_wrapper())
            }
            ComponentKind::Name(policy) => {
                token.kind == TokenKind::Identifier
                    && match policy {
                        NamePolicy::NewGlobal => !self.context.has_global(scope, &token.text),
                        NamePolicy::NewLocal => !self.context.has_local(scope, &token.text),
                        _ => self.context.has_global(scope, &token.text),
                    }
            }
            ComponentKind::Structure(target) => {
                let grammar = self.grammar;
                match grammar.structure(&target.name) {
                    Some(inner) => match inner.structure.first() {
                        Some(first) => self.can_start(inner, first, scope)?,
                        None => false,
                    },
                    None => false,
                }
            }
            ComponentKind::Expression
            | ComponentKind::Expressions(_)
            | ComponentKind::RepeatedElement(_) => true,
        })
    }

    /// Returns `true` if the tokens of the literal `text` appear at the cursor, each
    /// directly adjacent to the one before it.
    fn literal_matches(&mut self, text: &str) -> Result<bool, ParseError> {
        let expected = self.literal(text)?;
        let mut previous: Option<&Token> = None;

        for (offset, wanted) in expected.iter().enumerate() {
            let Some(found) = self.stream.peek_at(offset) else {
                return Ok(false);
            };
            if found.text != wanted.text || previous.is_some_and(|prev| !prev.is_adjacent_to(found)) {
                return Ok(false);
            }
            previous = Some(found);
        }

        Ok(!expected.is_empty())
    }

    /// Returns the tokens of the production literal `text`, tokenizing it on first use.
    pub(crate) fn literal(&mut self, text: &str) -> Result<Rc<[Token]>, ParseError> {
        if let Some(tokens) = self.literals.get(text) {
            return Ok(Rc::clone(tokens));
        }

        let tokens: Rc<[Token]> = self
            .tokenizer
            .tokenize(text)
            .map_err(|err| {
                ParseError::new(
                    ErrorKind::UnmatchedLiteral,
                    format!("cannot tokenize literal `{text}`: {err}"),
                )
            })?
            .into();
        trace!(literal = text, tokens = tokens.len(), "tokenized literal");
        self.literals.insert(text.to_string(), Rc::clone(&tokens));
        Ok(tokens)
    }

    /// Returns the text of the first token of the production literal `text`, which is
    /// what a terminator check compares against.
    pub(crate) fn literal_head(&mut self, text: &str) -> Result<String, ParseError> {
        Ok(self
            .literal(text)?
            .first()
            .map(|token| token.text.clone())
            .unwrap_or_else(|| text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grammar::{fixtures, object::OperatorShape, types::TypeSpec},
        lexer::{Lexer, Tokenize},
    };

    fn names(candidates: &[Rc<StructuredObject>]) -> Vec<&str> {
        candidates.iter().map(|object| object.name.as_str()).collect()
    }

    #[test]
    fn check_statement_candidates() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("int x = 1;").unwrap();
        let mut parser = Parser::new(&grammar, &lexer, tokens);

        let candidates = parser
            .candidates(ScopeId::ROOT, &StructureFilter::all(), false)
            .unwrap();
        // operators such as `struct_literal` are never statements
        assert_eq!(names(&candidates), vec!["var_decl", "field_decl", "function_def"]);
    }

    #[test]
    fn check_name_candidates_follow_the_symbol_table() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("x = 1;").unwrap();
        let mut parser = Parser::new(&grammar, &lexer, tokens);

        let all = StructureFilter::all();
        assert!(parser.candidates(ScopeId::ROOT, &all, false).unwrap().is_empty());

        parser.context.declare(ScopeId::ROOT, "x", TypeSpec::named("int"));
        assert_eq!(
            names(&parser.candidates(ScopeId::ROOT, &all, false).unwrap()),
            vec!["assignment"]
        );
    }

    #[test]
    fn check_operator_candidates_skip_leading_operands() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("- 1").unwrap();
        let mut parser = Parser::new(&grammar, &lexer, tokens);

        let binary = StructureFilter::operators(&[OperatorShape::Binary, OperatorShape::UnaryLeft]);
        assert_eq!(
            names(&parser.candidates(ScopeId::ROOT, &binary, true).unwrap()),
            vec!["-"]
        );

        let prefix = StructureFilter::operators(&[OperatorShape::UnaryRight, OperatorShape::Internal]);
        assert_eq!(
            names(&parser.candidates(ScopeId::ROOT, &prefix, true).unwrap()),
            vec!["neg"]
        );
    }

    #[test]
    fn check_best_trial_prefers_the_earliest_on_ties() {
        let trial = |value| Trial {
            value,
            end: 0,
            changes: Changeset::default(),
        };
        let best = Parser::best(vec![(2, trial("a")), (3, trial("b")), (3, trial("c"))]);
        assert_eq!(best.map(|trial| trial.value), Some("b"));
        assert!(Parser::best::<()>(Vec::new()).is_none());
    }

    #[test]
    fn check_attempt_restores_state() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("a b c").unwrap();
        let mut parser = Parser::new(&grammar, &lexer, tokens);

        let failed: Result<Trial<()>, _> = parser.attempt(|parser| {
            parser.stream.advance();
            parser.context.declare(ScopeId::ROOT, "a", TypeSpec::named("int"));
            Err(ParseError::new(ErrorKind::UnmatchedLiteral, "nope"))
        });
        assert!(failed.is_err());
        assert_eq!(parser.stream.position(), 0);
        assert!(!parser.context.has_global(ScopeId::ROOT, "a"));

        let trial = parser
            .attempt(|parser| {
                parser.stream.advance();
                parser.stream.advance();
                parser.context.declare(ScopeId::ROOT, "b", TypeSpec::named("int"));
                Ok(())
            })
            .unwrap();
        assert_eq!(parser.stream.position(), 0);
        assert!(!parser.context.has_global(ScopeId::ROOT, "b"));

        parser.commit(trial);
        assert_eq!(parser.stream.position(), 2);
        assert!(parser.context.has_global(ScopeId::ROOT, "b"));
    }
}
