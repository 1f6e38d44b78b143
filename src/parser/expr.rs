//! The operator-precedence engine used for expression slots.
//!
//! # Splicing
//! The engine keeps a stack of finished values and the right spine of one open
//! operator tree: the root first and the most recently spliced operator last. Every
//! spine node except the last has its trailing expression slot empty; that slot is
//! pending and belongs to the next node on the spine.
//!
//! An operator is parsed whole, with its trailing slot holding a single operand, and
//! then spliced into the tree. Starting from the deepest node, it climbs over every
//! ancestor it binds looser than, and takes the subtree below where it stops as its
//! first leading operand. Values pushed after that subtree fill the remaining
//! leading slots in order.
//!
//! A trailing operand that is itself a prefix operator stays open: it is moved onto
//! the spine, so a tighter operator that follows can still take its operand.
//!
//! Nodes hold their children by value, and nothing points back up the tree once the
//! spine is folded.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::{
    ast::instance::{Item, Node, OperatorFields, StructuredObjectInstance, ValueToken},
    context::ScopeId,
    error::{ErrorKind, Location, ParseError},
    grammar::{
        filter::StructureFilter,
        object::{Associativity, OperatorShape, StructuredObject},
        types::TypeSpec,
    },
    lexer::token::{Token, TokenKind},
    typeck::TypeResolver,
};

use super::{structure::StructureMode, Parser};

/// Where an expression ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Bound {
    /// Exactly one operand: a value or a prefix operator with its own operand.
    Operand,
    /// As much as possible, stopping at the end of the stream, at an expression
    /// separator or before the token `until`.
    Full {
        /// The text of the token that ends the expression, left unconsumed.
        until: Option<String>,
        /// Stop without an error at the first token that cannot extend the
        /// expression, so that the next component can claim it.
        lenient: bool,
    },
}

/// The state of one expression being parsed.
#[derive(Debug, Default)]
struct Engine {
    /// Values not yet attached to an operator.
    stack: Vec<Node>,
    /// The right spine of the open operator tree, root first.
    spine: Vec<StructuredObjectInstance>,
}

impl Engine {
    /// Returns `true` if the next token may continue an operand on its left.
    #[inline(always)]
    fn has_left(&self) -> bool {
        !self.spine.is_empty() || !self.stack.is_empty()
    }

    /// Inserts the parsed operator `instance` into the open tree.
    ///
    /// Every check runs before anything is moved, so a failed splice leaves the
    /// engine unchanged.
    fn splice(&mut self, mut instance: StructuredObjectInstance) -> Result<(), ParseError> {
        let production = Rc::clone(&instance.production);
        let fields = production.leading_fields();
        let location = instance.location;

        if fields.is_empty() {
            if self.has_left() {
                return Err(ParseError::new(
                    ErrorKind::UnresolvableExpression,
                    format!("unexpected operator `{}` after an operand", production.name),
                )
                .located(location));
            }
            debug!(operator = %production.name, "opened expression tree");
            self.spine.push(instance);
            return Ok(());
        }

        let from_stack = match self.spine.is_empty() {
            true => fields.len(),
            false => fields.len() - 1,
        };
        if self.stack.len() < from_stack {
            return Err(ParseError::new(
                ErrorKind::UnresolvableExpression,
                format!(
                    "`{}` expects {} operands on its left",
                    production.name,
                    fields.len()
                ),
            )
            .located(location));
        }

        let mut depth = self.spine.len();
        while depth > 0 && climbs(&self.spine[depth - 1], &production) {
            let ancestor = &self.spine[depth - 1];
            let pending = usize::from(depth < self.spine.len());
            if ancestor.components.len() + pending != ancestor.production.field_count() {
                return Err(ParseError::new(
                    ErrorKind::IncompleteOperator,
                    format!("`{}` is not fully parsed", ancestor.name()),
                )
                .located(ancestor.location));
            }
            depth -= 1;
        }

        let steal = match depth > 0 && depth == self.spine.len() {
            true => {
                let ancestor = &self.spine[depth - 1];
                let field = ancestor.production.trailing_field().map(String::from);
                match field {
                    Some(field) if matches!(ancestor.get(&field), Some(Item::Expression(_))) => {
                        Some(field)
                    }
                    _ => {
                        return Err(ParseError::new(
                            ErrorKind::IncompleteOperator,
                            format!(
                                "`{}` has no trailing operand to give to `{}`",
                                ancestor.name(),
                                production.name
                            ),
                        )
                        .located(location))
                    }
                }
            }
            false => None,
        };

        let mut operands = Vec::with_capacity(fields.len());
        if !self.spine.is_empty() {
            let left = match steal {
                Some(field) => match self.spine[depth - 1].components.remove(&field) {
                    Some(Item::Expression(node)) => Some(node),
                    _ => None,
                },
                None => fold(self.spine.split_off(depth)),
            };
            operands.extend(left);
        }
        operands.extend(self.stack.split_off(self.stack.len() - from_stack));

        for (field, operand) in fields.iter().zip(operands) {
            instance
                .components
                .insert(field.to_string(), Item::Expression(operand));
        }

        debug!(operator = %production.name, depth, "spliced operator");
        self.spine.push(instance);
        self.unfold();
        Ok(())
    }

    /// Moves trailing operands that are open prefix operators onto the spine.
    fn unfold(&mut self) {
        while let Some(last) = self.spine.last_mut() {
            let Some(field) = last.production.trailing_field().map(String::from) else {
                return;
            };
            let open = matches!(
                last.get(&field),
                Some(Item::Expression(Node::Instance(inner)))
                    if inner.operator.is_some()
                        && inner.production.shape().is_some_and(|shape| shape.takes_right())
            );
            if !open {
                return;
            }

            match last.components.remove(&field) {
                Some(Item::Expression(Node::Instance(inner))) => {
                    trace!(operator = %inner.name(), "reopened trailing operand");
                    self.spine.push(*inner);
                }
                _ => return,
            }
        }
    }

    /// Folds the open tree onto the stack and returns the only remaining value.
    fn finish(mut self, location: Option<Location>) -> Result<Node, ParseError> {
        if let Some(root) = fold(std::mem::take(&mut self.spine)) {
            self.stack.push(root);
        }

        match self.stack.len() {
            0 => Err(ParseError::new(ErrorKind::UnresolvableExpression, "expected an expression")
                .located(location)),
            1 => self.stack.pop().ok_or_else(|| {
                ParseError::new(ErrorKind::UnresolvableExpression, "expected an expression")
            }),
            count => Err(ParseError::new(
                ErrorKind::UnresolvableExpression,
                format!(
                    "expression does not reduce to a single value ({count} values: {})",
                    self.stack
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
            .located(location)),
        }
    }
}

/// Returns `true` if `operator` takes `ancestor` as (part of) its left operand
/// rather than nesting inside the trailing slot of `ancestor`.
fn climbs(ancestor: &StructuredObjectInstance, operator: &StructuredObject) -> bool {
    if matches!(
        ancestor.production.shape(),
        Some(OperatorShape::UnaryLeft | OperatorShape::Internal)
    ) {
        return true;
    }

    match (&ancestor.production.create_operator, &operator.create_operator) {
        (Some(theirs), Some(ours)) => {
            theirs.precedence < ours.precedence
                || (theirs.precedence == ours.precedence
                    && ours.associativity == Associativity::LeftToRight)
        }
        _ => false,
    }
}

/// Attaches each node of a spine segment to the trailing slot of its parent and
/// returns the segment's root.
fn fold(mut chain: Vec<StructuredObjectInstance>) -> Option<Node> {
    let mut node: Option<Node> = None;

    while let Some(mut instance) = chain.pop() {
        if let Some(child) = node.take() {
            if let Some(field) = instance.production.trailing_field().map(String::from) {
                instance.components.insert(field, Item::Expression(child));
            }
        }
        node = Some(instance.into());
    }

    node
}

impl<'g> Parser<'g> {
    /// Parses an expression in `scope`, ending according to `bound`, and resolves the
    /// types of its operators.
    ///
    /// A [`Bound::Operand`] is left unresolved: the expression that takes it resolves
    /// it once it is complete.
    pub(crate) fn expression(&mut self, scope: ScopeId, bound: &Bound) -> Result<Node, ParseError> {
        let location = self.stream.location();
        let (until, lenient, once) = match bound {
            Bound::Operand => (None, false, true),
            Bound::Full { until, lenient } => (until.as_deref(), *lenient, false),
        };

        let mut engine = Engine::default();
        loop {
            match self.stream.peek() {
                None => break,
                Some(token) if token.kind == TokenKind::ExpressionSeparator => break,
                Some(token) if until == Some(token.text.as_str()) => break,
                Some(_) => {}
            }

            let start = self.stream.position();
            let checkpoint = self.context.checkpoint();
            match self.step(&mut engine, scope, lenient) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) if lenient => {
                    trace!(error = %err, "lenient expression stopped");
                    self.stream.goto(start);
                    self.context.rollback(checkpoint);
                    break;
                }
                Err(err) => return Err(err),
            }

            if once {
                break;
            }
        }

        let mut node = engine.finish(location)?;
        if !once {
            TypeResolver::new(&self.context, scope).resolve(&mut node)?;
        }
        Ok(node)
    }

    /// Extends the expression in `engine` by one operator or one value.
    ///
    /// Returns `false` if a lenient expression cannot be extended.
    fn step(&mut self, engine: &mut Engine, scope: ScopeId, lenient: bool) -> Result<bool, ParseError> {
        let has_left = engine.has_left();
        let shapes = match has_left {
            true => [OperatorShape::Binary, OperatorShape::UnaryLeft],
            false => [OperatorShape::UnaryRight, OperatorShape::Internal],
        };
        let candidates = self.candidates(scope, &StructureFilter::operators(&shapes), true)?;

        let mut trials = Vec::new();
        for candidate in candidates {
            let Some(shape) = candidate.shape() else {
                continue;
            };
            let mode = StructureMode {
                from: match has_left {
                    true => candidate.leading_expressions(),
                    false => 0,
                },
                operand_tail: true,
                lenient: false,
            };

            let name = candidate.name.clone();
            let attempt = self.attempt(|parser| {
                let mut instance = parser.structure(candidate, scope, &[], mode)?;
                instance.operator = Some(OperatorFields {
                    shape,
                    result_type: None,
                });
                Ok(instance)
            });

            match attempt {
                Ok(trial) => trials.push((trial.value.components.len(), trial)),
                Err(err) => trace!(operator = %name, error = %err, "operator does not match"),
            }
        }

        if let Some(trial) = Self::best(trials) {
            let instance = self.commit(trial);
            engine.splice(instance)?;
            return Ok(true);
        }

        if has_left && lenient {
            return Ok(false);
        }

        let Some(token) = self.stream.peek().cloned() else {
            return Ok(false);
        };
        let node = self.value(&token, scope)?;
        trace!(value = %token.text, "pushed value");
        self.stream.advance();
        engine.stack.push(node);
        Ok(true)
    }

    /// Types the literal or identifier `token` as an expression leaf.
    fn value(&self, token: &Token, scope: ScopeId) -> Result<Node, ParseError> {
        let ty = match token.kind {
            TokenKind::Integer => self.literal_type("$int", token)?,
            TokenKind::Float => self.literal_type("$float", token)?,
            TokenKind::String => self.literal_type("$string", token)?,
            TokenKind::ValueKeyword => self.literal_type(&token.text, token)?,
            TokenKind::Identifier => match self.context.lookup(scope, &token.text) {
                Some(ty) => ty.clone(),
                None => {
                    return Err(ParseError::at(
                        ErrorKind::UndeclaredName,
                        token,
                        format!("`{}` is not declared", token.text),
                    ))
                }
            },
            _ => {
                return Err(ParseError::at(
                    ErrorKind::UnresolvableExpression,
                    token,
                    format!("unexpected {} `{}` in expression", token.kind, token.text),
                ))
            }
        };

        Ok(Node::Value(ValueToken {
            token: token.clone(),
            ty,
        }))
    }

    /// Returns the primitive type produced by the initializer `format`.
    fn literal_type(&self, format: &str, token: &Token) -> Result<TypeSpec, ParseError> {
        self.grammar
            .initializer(format)
            .map(|initializer| TypeSpec::named(&initializer.ty))
            .ok_or_else(|| {
                ParseError::at(
                    ErrorKind::InvalidType,
                    token,
                    format!("no primitive type accepts `{}`", token.text),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        grammar::{fixtures, GrammarSpec},
        lexer::{Lexer, Tokenize},
    };

    fn parse(grammar: &GrammarSpec, source: &str) -> Result<Node, ParseError> {
        let lexer = Lexer::for_grammar(grammar);
        let tokens = lexer.tokenize(source).unwrap();
        let mut parser = Parser::new(grammar, &lexer, tokens);
        parser.expression(
            ScopeId::ROOT,
            &Bound::Full {
                until: None,
                lenient: false,
            },
        )
    }

    #[rstest]
    #[case("5", "5", "int")]
    #[case("5 + 4 * 6.5", "(+ 5 (* 4 6.5))", "float")]
    #[case("5 * 4 + 6", "(+ (* 5 4) 6)", "int")]
    #[case("5 + 4 + 6", "(+ (+ 5 4) 6)", "int")]
    #[case("5 ++ 4 ++ 6", "(++ 5 (++ 4 6))", "int")]
    #[case("5 - -8", "(- 5 (neg 8))", "int")]
    #[case("- 2 * 3", "(* (neg 2) 3)", "int")]
    #[case("(5 + 4) * 6", "(* (parens (+ 5 4)) 6)", "int")]
    #[case("5 > 3 ? 1 : 0", "(ternary (> 5 3) 1 0)", "int")]
    #[case("1 < 2 ? 1.5 : 2.5 + 1", "(ternary (< 1 2) 1.5 (+ 2.5 1))", "float")]
    #[case("\"a\" + \"b\"", "(+ \"a\" \"b\")", "string")]
    fn check_precedence(#[case] source: &str, #[case] tree: &str, #[case] ty: &str) {
        let grammar = fixtures::standard();
        let node = parse(&grammar, source).unwrap();
        dbg!(&node);
        assert_eq!(node.to_string(), tree);
        assert_eq!(node.ty().map(ToString::to_string).as_deref(), Some(ty));
    }

    #[test]
    fn check_mixfix_operator_wins_over_binary() {
        let grammar = fixtures::standard_with(json!([{
            "name": "weird",
            "structure": "$x1 + $x2 ? $x3 @ $x4 $$",
            "components": {
                "x1": {"base": "expression"},
                "x2": {"base": "expression"},
                "x3": {"base": "expression"},
                "x4": {"base": "expression"}
            },
            "create_operator": {
                "fields": ["x1", "x2", "x3", "x4"],
                "precedence": 16,
                "overloads": [{
                    "fields": {
                        "x1": "int",
                        "x2": "int",
                        "x3": "$typename<T>",
                        "x4": "$typename<T>"
                    },
                    "returns": "$typename<T>"
                }]
            }
        }]));

        let node = parse(&grammar, "1 + 2 ? 3.5 @ 4.5 $").unwrap();
        assert_eq!(node.to_string(), "(weird 1 2 3.5 4.5)");
        assert_eq!(node.ty(), Some(&TypeSpec::named("float")));

        // without the trailing `$` only the binary reading remains
        let node = parse(&grammar, "1 + 2").unwrap();
        assert_eq!(node.to_string(), "(+ 1 2)");
    }

    #[test]
    fn check_postfix_operands_keep_their_order() {
        let grammar = fixtures::standard_with(json!({
            "name": "rpn",
            "structure": "$l $r +",
            "components": {
                "l": {"base": "expression"},
                "r": {"base": "expression"}
            },
            "create_operator": {
                "fields": ["l", "r"],
                "precedence": 1,
                "overloads": [{
                    "fields": {"l": "int", "r": "float"},
                    "returns": "float"
                }]
            }
        }));

        let node = parse(&grammar, "1 2.5 +").unwrap();
        assert_eq!(node.to_string(), "(rpn 1 2.5)");

        // the open tree holds the earliest operand
        let node = parse(&grammar, "2.5 * 1 2.5 +").unwrap();
        assert_eq!(node.to_string(), "(* 2.5 (rpn 1 2.5))");
        assert_eq!(node.ty(), Some(&TypeSpec::named("float")));

        let err = parse(&grammar, "2.5 * 2.5 1 +").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoMatchingOverload);
    }

    #[rstest]
    #[case("- 2 ** 2", "(neg (** 2 2))")]
    #[case("1 - - 2 ** 2", "(- 1 (neg (** 2 2)))")]
    #[case("1 - - 2 * 3", "(- 1 (* (neg 2) 3))")]
    #[case("- - 2 ** 2", "(neg (neg (** 2 2)))")]
    fn check_prefix_operands_stay_open(#[case] source: &str, #[case] tree: &str) {
        let grammar = fixtures::standard_with(json!({
            "name": "**",
            "structure": "$left ** $right",
            "components": {
                "left": {"base": "expression"},
                "right": {"base": "expression"}
            },
            "create_operator": {
                "fields": ["left", "right"],
                "precedence": 2,
                "associativity": "right-to-left",
                "overloads": [{
                    "fields": {"left": "int", "right": "int"},
                    "returns": "int"
                }]
            }
        }));

        let node = parse(&grammar, source).unwrap();
        assert_eq!(node.to_string(), tree);
        assert_eq!(node.ty(), Some(&TypeSpec::named("int")));
    }

    #[test]
    fn check_expression_errors() {
        let grammar = fixtures::standard();

        let err = parse(&grammar, "1 + true").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoMatchingOverload);

        let err = parse(&grammar, "1 2").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvableExpression);

        let err = parse(&grammar, "x + 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndeclaredName);

        let err = parse(&grammar, "").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvableExpression);

        let err = parse(&grammar, "1 > 2 ? 1 : 2.5").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoMatchingOverload);
    }

    #[test]
    fn check_bounds() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("1 + 2 ) 3").unwrap();
        let mut parser = Parser::new(&grammar, &lexer, tokens);

        let node = parser
            .expression(
                ScopeId::ROOT,
                &Bound::Full {
                    until: Some(")".to_string()),
                    lenient: false,
                },
            )
            .unwrap();
        assert_eq!(node.to_string(), "(+ 1 2)");
        assert_eq!(parser.stream.position(), 3);

        parser.stream.goto(0);
        let node = parser.expression(ScopeId::ROOT, &Bound::Operand).unwrap();
        assert_eq!(node.to_string(), "1");
        assert_eq!(parser.stream.position(), 1);

        parser.stream.goto(0);
        let lenient = Bound::Full {
            until: None,
            lenient: true,
        };
        let node = parser.expression(ScopeId::ROOT, &lenient).unwrap();
        assert_eq!(node.to_string(), "(+ 1 2)");
        assert_eq!(parser.stream.position(), 3);
    }

    #[test]
    fn check_splice_rejects_operator_after_operand() {
        let grammar = fixtures::standard();
        let neg = grammar.structure("neg").unwrap();

        let mut engine = Engine::default();
        engine.stack.push(Node::Value(ValueToken {
            token: Token::new(TokenKind::Integer, "1", 1, 1),
            ty: TypeSpec::named("int"),
        }));
        let err = engine
            .splice(StructuredObjectInstance::new(Rc::clone(neg), None))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvableExpression);
        assert_eq!(engine.stack.len(), 1);
    }
}
