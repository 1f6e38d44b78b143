//! The declarations made by a statement once it has been chosen.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    ast::instance::{Item, StructuredObjectInstance},
    context::ScopeId,
    error::{ErrorKind, ParseError},
    grammar::{
        config::{ComponentPath, Reference},
        object::{CreateType, CreateVariable, DeclarationScope},
        types::{Attribute, TypeSpec, TYPE_WRAPPER},
    },
    typeck::{Bindings, TypeResolver},
};

use super::{
    paths::{self, Found},
    Parser,
};

impl<'g> Parser<'g> {
    /// Applies the declaration directives of the statement `instance`, parsed in
    /// `scope`.
    pub(crate) fn apply_effects(
        &mut self,
        instance: &StructuredObjectInstance,
        scope: ScopeId,
    ) -> Result<(), ParseError> {
        let production = &instance.production;
        if let Some(directive) = &production.create_variable {
            self.create_variable(directive, instance, scope)?;
        }
        if let Some(directive) = &production.create_type {
            self.create_type(directive, instance, scope)?;
        }
        Ok(())
    }

    /// Declares the variable described by `directive`.
    fn create_variable(
        &mut self,
        directive: &CreateVariable,
        instance: &StructuredObjectInstance,
        scope: ScopeId,
    ) -> Result<(), ParseError> {
        let name = self.declared_name(&directive.name, instance)?;

        let resolver = TypeResolver::new(&self.context, scope);
        let ty = resolver.realize(&directive.ty, instance, &Bindings::new())?;
        if let Some(check) = &directive.check_type {
            let expected = resolver.realize(check, instance, &Bindings::new())?;
            if !ty.matches(&expected) {
                return Err(ParseError::new(
                    ErrorKind::InvalidType,
                    format!("`{name}` is declared as `{ty}` but given `{expected}`"),
                )
                .located(instance.location));
            }
        }

        let mut attributes = BTreeMap::new();
        for (key, path) in &directive.attributes {
            attributes.insert(key.clone(), attribute(instance, path)?);
        }
        let ty = match attributes.is_empty() {
            true => ty,
            false => ty.with_attributes(attributes),
        };

        let target = match directive.scope {
            DeclarationScope::Local => scope,
            DeclarationScope::Global => ScopeId::ROOT,
        };
        debug!(%name, %ty, scope = %target, "declared variable");
        self.context.declare(target, name, ty);
        Ok(())
    }

    /// Declares the type described by `directive`.
    fn create_type(
        &mut self,
        directive: &CreateType,
        instance: &StructuredObjectInstance,
        scope: ScopeId,
    ) -> Result<(), ParseError> {
        let ty = TypeResolver::new(&self.context, scope).realize(&directive.ty, instance, &Bindings::new())?;
        self.check_valid(&ty, &ty.name, scope).map_err(|err| err.located(instance.location))?;

        let mut fields = BTreeMap::new();
        for path in &directive.fields_containers {
            match paths::lookup(&[&instance.components], path) {
                Some(Found::One(Item::Expressions {
                    scope: Some(block), ..
                })) => {
                    for (name, field) in self.context.symbols(*block) {
                        fields.insert(name.to_string(), Attribute::Single(field.clone()));
                    }
                }
                _ => {
                    return Err(ParseError::new(
                        ErrorKind::InvalidType,
                        format!("`{path}` of `{}` is not a local statement block", instance.name()),
                    )
                    .located(instance.location))
                }
            }
        }

        let name = ty.name.clone();
        let wrapper = TypeSpec {
            name: TYPE_WRAPPER.to_string(),
            subtypes: vec![ty],
            attributes: fields,
            associated_structure: Some(instance.name().to_string()),
        };
        debug!(%name, fields = wrapper.attributes.len(), "declared type");
        self.context.declare(scope, name, wrapper);
        Ok(())
    }

    /// Checks that `ty` and its arguments name known types. `own` is the type being
    /// declared, which may refer to itself.
    fn check_valid(&self, ty: &TypeSpec, own: &str, scope: ScopeId) -> Result<(), ParseError> {
        let known = ty.name == own
            || self.grammar.is_primitive(&ty.name)
            || self
                .context
                .lookup(scope, &ty.name)
                .is_some_and(TypeSpec::is_type_wrapper);

        match known {
            true => ty
                .subtypes
                .iter()
                .try_for_each(|subtype| self.check_valid(subtype, own, scope)),
            false => Err(ParseError::new(
                ErrorKind::InvalidType,
                format!("`{}` is not a known type", ty.name),
            )),
        }
    }

    /// Resolves the declared name of a variable.
    fn declared_name(
        &self,
        reference: &Reference,
        instance: &StructuredObjectInstance,
    ) -> Result<String, ParseError> {
        let path = match reference {
            Reference::Literal(name) => return Ok(name.clone()),
            Reference::Component(path) => path,
        };

        match paths::lookup(&[&instance.components], path) {
            Some(Found::One(Item::Name(name))) => Ok(name.clone()),
            Some(Found::One(Item::Typename(ty))) => Ok(ty.name.clone()),
            _ => Err(ParseError::new(
                ErrorKind::UnresolvableExpression,
                format!("`{path}` of `{}` does not hold a name", instance.name()),
            )
            .located(instance.location)),
        }
    }
}

/// Reads the attribute at `path` of `instance`: one type, or a list of types through
/// a repeated element.
fn attribute(instance: &StructuredObjectInstance, path: &ComponentPath) -> Result<Attribute, ParseError> {
    let unresolved = || {
        ParseError::new(
            ErrorKind::InvalidType,
            format!("`{path}` of `{}` has no type", instance.name()),
        )
        .located(instance.location)
    };

    let ty = |item: &Item| match item {
        Item::Typename(ty) => Some(ty.clone()),
        Item::Expression(node) => node.ty().cloned(),
        Item::Name(name) => Some(TypeSpec::named(name)),
        _ => None,
    };

    match paths::lookup(&[&instance.components], path).ok_or_else(unresolved)? {
        Found::One(item) => ty(item).map(Attribute::Single).ok_or_else(unresolved),
        Found::Many(items) => items
            .into_iter()
            .map(ty)
            .collect::<Option<Vec<_>>>()
            .map(Attribute::List)
            .ok_or_else(unresolved),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        context::ScopeId,
        error::ErrorKind,
        grammar::{
            filter::StructureFilter,
            fixtures,
            types::{Attribute, TypeSpec},
        },
        lexer::{Lexer, Tokenize},
        parser::{
            parse_source,
            tests::{failure, render},
            Parser,
        },
    };

    #[test]
    fn check_variables_are_declared_in_their_scope() {
        let grammar = fixtures::standard();
        let ast = parse_source(&grammar, "int g = 1; if (g > 0) { float l = 2.5; }").unwrap();
        let context = ast.context();

        assert_eq!(context.lookup(ScopeId::ROOT, "g").map(ToString::to_string).as_deref(), Some("int"));
        assert!(context.lookup(ScopeId::ROOT, "l").is_none());
        let block = context.scopes().nth(1).unwrap();
        assert_eq!(context.lookup(block, "l").map(ToString::to_string).as_deref(), Some("float"));
    }

    #[test]
    fn check_functions_are_declared_globally() {
        let grammar = fixtures::standard();
        let ast = parse_source(&grammar, "if (true) { int inner(float x) { 1; } } int y = inner(2.5);").unwrap();

        let inner = ast.context().lookup(ScopeId::ROOT, "inner").unwrap();
        assert_eq!(
            inner.attributes.get("arguments"),
            Some(&Attribute::List(vec![TypeSpec::named("float")]))
        );
    }

    #[test]
    fn check_struct_declarations() {
        let grammar = fixtures::standard();
        let ast = parse_source(&grammar, "struct Inner { int v; } struct Outer { Inner i; bool b; }").unwrap();

        let outer = ast.context().lookup(ScopeId::ROOT, "Outer").unwrap();
        let declared = outer.declared_type().unwrap();
        assert_eq!(declared.to_string(), "Outer");
        assert_eq!(
            declared.attributes.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["b", "i"]
        );
        match &declared.attributes["i"] {
            Attribute::Single(inner) => assert!(inner.attributes.contains_key("v")),
            other => panic!("unexpected attribute {other:?}"),
        }

        let err = failure(&grammar, "struct S { int x; } struct S { int y; }");
        assert!(err.contains(ErrorKind::DuplicateDeclaration));
    }

    #[test]
    fn check_type_validity() {
        let grammar = fixtures::standard();
        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize("struct Leaf { int v; }").unwrap();
        let mut parser = Parser::new(&grammar, &lexer, tokens);
        parser.statements(ScopeId::ROOT, None, &StructureFilter::all()).unwrap();

        // a declared type may refer to itself, to primitives and to declared types
        let tree = TypeSpec::generic("Tree", vec![TypeSpec::named("Tree"), TypeSpec::named("Leaf")]);
        assert!(parser.check_valid(&tree, "Tree", ScopeId::ROOT).is_ok());
        let list = TypeSpec::generic("list", vec![TypeSpec::named("int")]);
        let err = parser.check_valid(&list, "Tree", ScopeId::ROOT).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidType);

        let grammar = fixtures::standard_with(json!({
            "name": "opaque",
            "structure": "opaque $name",
            "components": {
                "name": {"base": "name", "policy": "new-global"}
            },
            "create_type": {
                "type": "$name"
            }
        }));
        assert_eq!(render(&grammar, "opaque Box; Box b;"), vec!["(opaque Box)", "(field_decl Box b)"]);
    }
}
