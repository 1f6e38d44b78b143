//! Parsing one production, component by component.

use std::{iter, rc::Rc};

use tracing::{debug, trace};

use crate::{
    ast::instance::{Item, StructuredObjectInstance},
    context::ScopeId,
    error::{ErrorKind, ParseError},
    grammar::{
        config::Reference,
        object::StructuredObject,
        structure::{
            ComponentKind, ComponentSpec, ExpressionsSpec, NamePolicy, RepeatedElement,
            ScopeInsertion, ScopeMode, StructureComponent, StructureRef,
        },
        types::TypeSpec,
    },
    lexer::token::TokenKind,
};

use super::{
    expr::Bound,
    paths::{self, Components},
    Parser,
};

/// Options of one structural parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StructureMode {
    /// The index of the first component to parse; earlier ones are filled by the
    /// caller.
    pub(crate) from: usize,
    /// Parse a trailing expression slot as a single operand, leaving the rest of the
    /// expression to the engine that tried this production.
    pub(crate) operand_tail: bool,
    /// Stop expressions at the first token that cannot extend them instead of failing.
    pub(crate) lenient: bool,
}

impl<'g> Parser<'g> {
    /// Parses `production` at the cursor.
    ///
    /// `refs` holds the components of the enclosing instances, innermost first, so
    /// that dotted paths inside nested blocks can see their siblings.
    pub(crate) fn structure(
        &mut self,
        production: Rc<StructuredObject>,
        scope: ScopeId,
        refs: &[&Components],
        mode: StructureMode,
    ) -> Result<StructuredObjectInstance, ParseError> {
        let mut instance = StructuredObjectInstance::new(Rc::clone(&production), self.stream.location());

        for (index, component) in production.structure.iter().enumerate().skip(mode.from) {
            let variable = match component {
                StructureComponent::Literal(text) => {
                    self.expect_literal(text)?;
                    continue;
                }
                StructureComponent::Variable(variable) => variable,
            };

            let spec = production.spec(variable).ok_or_else(|| {
                ParseError::new(
                    ErrorKind::UnmatchedLiteral,
                    format!("`{}` has no spec for `${variable}`", production.name),
                )
            })?;

            if self.stream.is_done() {
                return Err(self.end_of_input(&format!("{} `${variable}`", spec.kind.describe())));
            }

            let next = production.structure.get(index + 1);
            let item = {
                let chain: Vec<&Components> = iter::once(&instance.components)
                    .chain(refs.iter().copied())
                    .collect();
                self.component(spec, next, scope, &chain, mode)?
            };
            instance.components.insert(spec.field.clone(), item);
        }

        trace!(production = %production.name, "parsed structure");
        Ok(instance)
    }

    /// Consumes the tokens of the literal `text`.
    fn expect_literal(&mut self, text: &str) -> Result<(), ParseError> {
        for expected in self.literal(text)?.iter() {
            match self.stream.next_token() {
                Some(found) if found.text == expected.text => {}
                Some(found) => {
                    return Err(ParseError::at(
                        ErrorKind::UnmatchedLiteral,
                        &found,
                        format!("expected `{}`, found `{}`", expected.text, found.text),
                    ))
                }
                None => return Err(self.end_of_input(&format!("`{text}`"))),
            }
        }
        Ok(())
    }

    /// Parses one variable component described by `spec`, followed in its
    /// production by `next`.
    fn component(
        &mut self,
        spec: &ComponentSpec,
        next: Option<&StructureComponent>,
        scope: ScopeId,
        chain: &[&Components],
        mode: StructureMode,
    ) -> Result<Item, ParseError> {
        match &spec.kind {
            ComponentKind::Typename => self.typename(scope),
            ComponentKind::Name(policy) => self.name(*policy, scope),
            ComponentKind::Expression => {
                let bound = match next {
                    Some(StructureComponent::Literal(text)) => Bound::Full {
                        until: Some(self.literal_head(text)?),
                        lenient: mode.lenient,
                    },
                    Some(StructureComponent::Variable(_)) => Bound::Full {
                        until: None,
                        lenient: true,
                    },
                    None if mode.operand_tail => Bound::Operand,
                    None => Bound::Full {
                        until: None,
                        lenient: mode.lenient,
                    },
                };
                Ok(Item::Expression(self.expression(scope, &bound)?))
            }
            ComponentKind::Expressions(block) => {
                let terminator = self.terminator(spec, next)?;
                self.expressions(block, &terminator, scope, chain)
            }
            ComponentKind::RepeatedElement(repeated) => {
                let terminator = self.terminator(spec, next)?;
                self.repeated(repeated, &terminator, scope, chain)
            }
            ComponentKind::Structure(target) => self.inlined(target, scope, chain),
        }
    }

    /// Returns the first token text of the literal following a block-like component.
    fn terminator(
        &mut self,
        spec: &ComponentSpec,
        next: Option<&StructureComponent>,
    ) -> Result<String, ParseError> {
        match next.and_then(StructureComponent::literal) {
            Some(text) => self.literal_head(text),
            None => Err(ParseError::new(
                ErrorKind::UnmatchedLiteral,
                format!("`{}` must be followed by a literal", spec.field),
            )),
        }
    }

    /// Parses a type name: a primitive, or a symbol declared as a type.
    fn typename(&mut self, scope: ScopeId) -> Result<Item, ParseError> {
        let Some(token) = self.stream.next_token() else {
            return Err(self.end_of_input("a type"));
        };

        if self.grammar.is_primitive(&token.text) {
            return Ok(Item::Typename(TypeSpec::named(token.text)));
        }

        match self
            .context
            .lookup(scope, &token.text)
            .and_then(TypeSpec::declared_type)
        {
            Some(ty) => Ok(Item::Typename(ty)),
            None => Err(ParseError::at(
                ErrorKind::InvalidType,
                &token,
                format!("`{}` is not a type", token.text),
            )),
        }
    }

    /// Parses an identifier and checks it against `policy`.
    fn name(&mut self, policy: NamePolicy, scope: ScopeId) -> Result<Item, ParseError> {
        let Some(token) = self.stream.next_token() else {
            return Err(self.end_of_input("a name"));
        };

        if token.kind != TokenKind::Identifier {
            return Err(ParseError::at(
                ErrorKind::UnmatchedLiteral,
                &token,
                format!("expected a name, found `{}`", token.text),
            ));
        }

        let name = &token.text;
        let failure = match policy {
            NamePolicy::ExistingGlobal if !self.context.has_global(scope, name) => {
                Some((ErrorKind::UndeclaredName, format!("`{name}` is not declared")))
            }
            NamePolicy::ExistingLocal if !self.context.has_local(scope, name) => Some((
                ErrorKind::UndeclaredName,
                format!("`{name}` is not declared in this scope"),
            )),
            NamePolicy::NewGlobal if self.context.has_global(scope, name) => Some((
                ErrorKind::DuplicateDeclaration,
                format!("`{name}` is already declared"),
            )),
            NamePolicy::NewLocal if self.context.has_local(scope, name) => Some((
                ErrorKind::DuplicateDeclaration,
                format!("`{name}` is already declared in this scope"),
            )),
            _ => None,
        };

        match failure {
            Some((kind, message)) => Err(ParseError::at(kind, &token, message)),
            None => Ok(Item::Name(token.text)),
        }
    }

    /// Parses a block of statements up to `terminator`.
    fn expressions(
        &mut self,
        block: &ExpressionsSpec,
        terminator: &str,
        scope: ScopeId,
        chain: &[&Components],
    ) -> Result<Item, ParseError> {
        let local = match block.scope {
            ScopeMode::Local => Some(self.context.open_scope(scope)),
            ScopeMode::Global => None,
        };
        let target = local.unwrap_or(scope);

        for insertion in &block.insert_scope {
            self.insert(insertion, target, chain)?;
        }

        let nodes = self.statements(target, Some(terminator), &block.filter)?;
        Ok(Item::Expressions {
            nodes,
            scope: local,
        })
    }

    /// Declares the symbols named by `insertion` in `target`.
    ///
    /// A single type is shared by every name; otherwise names and types pair up.
    fn insert(
        &mut self,
        insertion: &ScopeInsertion,
        target: ScopeId,
        chain: &[&Components],
    ) -> Result<(), ParseError> {
        let unresolved = |reference: &Reference| {
            ParseError::new(
                ErrorKind::UnresolvableExpression,
                format!("cannot resolve `{reference}` for a scope insertion"),
            )
            .located(self.stream.location())
        };

        let types: Vec<TypeSpec> = match &insertion.ty {
            Reference::Literal(name) => vec![TypeSpec::named(name)],
            Reference::Component(path) => paths::lookup(chain, path)
                .ok_or_else(|| unresolved(&insertion.ty))?
                .items()
                .into_iter()
                .map(|item| match item {
                    Item::Typename(ty) => Some(ty.clone()),
                    Item::Expression(node) => node.ty().cloned(),
                    _ => None,
                })
                .collect::<Option<_>>()
                .ok_or_else(|| unresolved(&insertion.ty))?,
        };

        let names: Vec<String> = match &insertion.name {
            Reference::Literal(name) => vec![name.clone()],
            Reference::Component(path) => paths::lookup(chain, path)
                .ok_or_else(|| unresolved(&insertion.name))?
                .items()
                .into_iter()
                .map(|item| match item {
                    Item::Name(name) => Some(name.clone()),
                    _ => None,
                })
                .collect::<Option<_>>()
                .ok_or_else(|| unresolved(&insertion.name))?,
        };

        let types = match (types.len(), names.len()) {
            (1, count) => vec![types[0].clone(); count],
            (left, right) if left == right => types,
            (left, right) => {
                return Err(ParseError::new(
                    ErrorKind::UnresolvableExpression,
                    format!("scope insertion pairs {right} names with {left} types"),
                )
                .located(self.stream.location()))
            }
        };

        for (name, ty) in names.into_iter().zip(types) {
            self.context.declare(target, name, ty);
        }
        Ok(())
    }

    /// Parses zero or more elements separated by the element separator, stopping
    /// before `terminator`.
    ///
    /// An element that fails to parse ends the list without an error, leaving the
    /// cursor where that element started.
    fn repeated(
        &mut self,
        repeated: &RepeatedElement,
        terminator: &str,
        scope: ScopeId,
        chain: &[&Components],
    ) -> Result<Item, ParseError> {
        let separator = self.literal_head(&repeated.separator)?;
        let mode = StructureMode {
            lenient: true,
            ..Default::default()
        };
        let mut elements = Vec::new();

        loop {
            match self.stream.peek() {
                None => break,
                Some(token) if token.text == terminator => break,
                Some(_) => {}
            }

            let element = self.attempt(|parser| {
                let element = parser.structure(Rc::clone(&repeated.element), scope, chain, mode)?;
                match parser.stream.peek() {
                    Some(token) if token.text == separator || token.text == terminator => Ok(element),
                    Some(token) => Err(ParseError::at(
                        ErrorKind::UnmatchedLiteral,
                        token,
                        format!("expected `{separator}` or `{terminator}`, found `{}`", token.text),
                    )),
                    None => Err(parser.end_of_input(&format!("`{terminator}`"))),
                }
            });

            match element {
                Ok(trial) => elements.push(self.commit(trial)),
                Err(err) => {
                    trace!(error = %err, "repeated element ended");
                    break;
                }
            }

            match self.stream.peek() {
                Some(token) if token.text == separator => self.stream.advance(),
                _ => break,
            }
        }

        debug!(element = %repeated.element.name, count = elements.len(), "parsed repeated element");
        Ok(Item::RepeatedElement(elements))
    }

    /// Parses the production named by `target`, with its per-use overrides applied.
    fn inlined(
        &mut self,
        target: &StructureRef,
        scope: ScopeId,
        chain: &[&Components],
    ) -> Result<Item, ParseError> {
        let grammar = self.grammar;
        let production = grammar.structure(&target.name).ok_or_else(|| {
            ParseError::new(
                ErrorKind::UnmatchedLiteral,
                format!("unknown structure `{}`", target.name),
            )
        })?;

        let production = match target.overrides.is_empty() {
            true => Rc::clone(production),
            false => Rc::new(production.with_overrides(&target.overrides)),
        };

        let instance = self.structure(production, scope, chain, StructureMode::default())?;
        Ok(Item::Structure(Box::new(instance)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        context::ScopeId,
        error::ErrorKind,
        grammar::fixtures,
        parser::{
            parse_source,
            tests::{failure, render},
        },
    };

    #[test]
    fn check_functions() {
        let grammar = fixtures::standard();
        let source = "int add(int a, int b) { a + b; } int r = add(1, 2);";
        assert_eq!(
            render(&grammar, source),
            vec![
                "(function_def int add [(int a) (int b)] (block [(+ a b)]))",
                "(var_decl int r (call add [(1) (2)]))",
            ]
        );

        let ast = parse_source(&grammar, source).unwrap();
        let add = ast.context().lookup(ScopeId::ROOT, "add").unwrap();
        assert_eq!(add.to_string(), "function<int>");
        assert_eq!(add.attributes["arguments"].to_string(), "[int, int]");
        assert_eq!(add.attributes["returns"].to_string(), "int");
        // parameters are scoped to the body
        assert!(ast.context().lookup(ScopeId::ROOT, "a").is_none());
    }

    #[test]
    fn check_empty_repeated_elements() {
        let grammar = fixtures::standard();
        assert_eq!(
            render(&grammar, "int zero() { 0; } int z = zero();"),
            vec![
                "(function_def int zero [] (block [0]))",
                "(var_decl int z (call zero []))",
            ]
        );
    }

    #[test]
    fn check_repeated_element_errors() {
        let grammar = fixtures::standard();

        // a malformed element ends the list, leaving `2` where `)` is expected
        let err = failure(&grammar, "int one(int a) { a; } one(1 2);");
        assert!(err.contains(ErrorKind::UnresolvableExpression));

        let err = failure(&grammar, "int one(int a) { a; } one(1.5);");
        assert!(err.contains(ErrorKind::NoMatchingOverload));
    }

    #[test]
    fn check_structs() {
        let grammar = fixtures::standard();
        let source = "struct Point { int x; float y; } \
                      Point p = Point { x = 1, y = 2.5 }; \
                      float f = p.y;";
        assert_eq!(
            render(&grammar, source),
            vec![
                "(struct_def Point [(field_decl int x) (field_decl float y)])",
                "(var_decl Point p (struct_literal Point [(x 1) (y 2.5)]))",
                "(var_decl float f (member p y))",
            ]
        );

        let ast = parse_source(&grammar, source).unwrap();
        let point = ast.context().lookup(ScopeId::ROOT, "Point").unwrap();
        assert!(point.is_type_wrapper());
        assert_eq!(point.associated_structure.as_deref(), Some("struct_def"));
        assert_eq!(point.attributes.len(), 2);

        // a negated member access binds the same after a binary operator
        assert_eq!(
            render(&grammar, "struct P { int y; } P p = P { y = 1 }; int z = 1 - -p.y;")[2],
            "(var_decl int z (- 1 (neg (member p y))))"
        );
    }

    #[test]
    fn check_struct_errors() {
        let grammar = fixtures::standard();

        // struct bodies only admit field declarations
        let err = failure(&grammar, "struct S { int x = 1; }");
        assert!(err.traceback().contains("no structure can start with `=`"));

        // a struct literal must name every field
        let err = failure(&grammar, "struct S { int x; int y; } S s; s = S { x = 1 };");
        assert!(err.contains(ErrorKind::NoMatchingOverload));

        // naming one field twice does not initialize the others
        let err = failure(&grammar, "struct S { int x; int y; } S s; s = S { x = 1, x = 2 };");
        assert!(err.contains(ErrorKind::NoMatchingOverload));

        // field types must agree
        let err = failure(&grammar, "struct S { int x; } S s; s = S { x = 1.5 };");
        assert!(err.contains(ErrorKind::NoMatchingOverload));

        let err = failure(&grammar, "struct S { int x; } float f; f = S { x = 1 }.z;");
        assert!(err.contains(ErrorKind::InvalidType));
    }

    #[test]
    fn check_existing_local_names() {
        let grammar = fixtures::standard_with(json!({
            "name": "touch",
            "structure": "touch $name",
            "components": {
                "name": {"base": "name", "policy": "existing-local"}
            }
        }));

        // a global is not local to the block
        let err = failure(&grammar, "int x = 1; if (true) { touch x; }");
        assert!(err.contains(ErrorKind::UndeclaredName));

        assert_eq!(
            render(&grammar, "int x = 1; if (true) { int x = 2; touch x; }"),
            vec![
                "(var_decl int x 1)",
                "(if true (block [(var_decl int x 2) (touch x)]))",
            ]
        );
    }
}
