//! Overload resolution for operator instances.
//!
//! Every operator production declares the component paths that select an overload
//! and, per overload, the type expected at each path. The first overload whose
//! expectations all unify with the actual types wins, and its return type becomes
//! the result type of the instance.
//!
//! Unification is shallow on purpose: a generic binds to the first type it meets
//! and later occurrences of it must match that type exactly.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    ast::instance::{Item, Node, StructuredObjectInstance},
    context::{ParsingContext, ScopeId},
    error::{ErrorKind, ParseError},
    grammar::{
        config::{ComponentPath, ConfigTypeSpec, PathSegment},
        types::{join, Attribute, TypeSpec},
    },
    parser::paths::{self, Found},
};

/// The generics bound during one overload attempt.
pub type Bindings = BTreeMap<String, TypeSpec>;

/// The type found at a component path: one type, or one per repeated element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actual {
    /// The path names a single component.
    Scalar(TypeSpec),
    /// The path passes through a repeated element.
    List(Vec<TypeSpec>),
}

impl Display for Actual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(ty) => write!(f, "{ty}"),
            Self::List(types) => write!(f, "[{}]", join(types)),
        }
    }
}

impl Actual {
    /// Returns `true` if `self` and `other` have the same shape and matching types.
    fn matches(&self, other: &Actual) -> bool {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => left.matches(right),
            (Self::List(left), Self::List(right)) => {
                left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.matches(r))
            }
            _ => false,
        }
    }
}

/// Resolves the types of operator instances against a symbol table.
#[derive(Debug, Clone, Copy)]
pub struct TypeResolver<'a> {
    /// The symbols visible to the expression.
    context: &'a ParsingContext,
    /// The scope the expression was parsed in.
    scope: ScopeId,
}

impl<'a> TypeResolver<'a> {
    /// Constructs a resolver for expressions parsed in `scope`.
    pub fn new(context: &'a ParsingContext, scope: ScopeId) -> Self {
        Self { context, scope }
    }

    /// Resolves every unresolved operator in the tree rooted at `node`, children first.
    pub fn resolve(&self, node: &mut Node) -> Result<(), ParseError> {
        let Node::Instance(instance) = node else {
            return Ok(());
        };
        if instance.operator.is_none() || instance.result_type().is_some() {
            return Ok(());
        }

        for item in instance.components.values_mut() {
            if let Item::Expression(child) = item {
                self.resolve(child)?;
            }
        }
        self.type_operator(instance)
    }

    /// Selects the overload of the operator `instance` and records its result type.
    pub fn type_operator(&self, instance: &mut StructuredObjectInstance) -> Result<(), ParseError> {
        let production = Rc::clone(&instance.production);
        let Some(operator) = &production.create_operator else {
            return Ok(());
        };

        let actuals = operator
            .fields
            .iter()
            .map(|path| {
                self.actual(instance, path).ok_or_else(|| {
                    ParseError::new(
                        ErrorKind::UnresolvableExpression,
                        format!("operand `{path}` of `{}` has no type", production.name),
                    )
                    .located(instance.location)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (index, overload) in operator.overloads.iter().enumerate() {
            let mut generics = Bindings::new();
            let unified = overload.fields.iter().all(|(path, expected)| {
                operator
                    .fields
                    .iter()
                    .position(|field| field == path)
                    .is_some_and(|at| self.unify(expected, &actuals[at], instance, &mut generics))
            });

            if !unified {
                trace!(operator = %production.name, overload = index, "overload rejected");
                continue;
            }

            let ty = self.realize(&overload.returns, instance, &generics)?;
            debug!(operator = %production.name, overload = index, result = %ty, "chose overload");
            if let Some(fields) = instance.operator.as_mut() {
                fields.result_type = Some(ty);
            }
            return Ok(());
        }

        Err(ParseError::new(
            ErrorKind::NoMatchingOverload,
            format!(
                "no overload of `{}` accepts ({})",
                production.name,
                actuals
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )
        .located(instance.location))
    }

    /// Returns the type of the value at `path` in `instance`.
    fn actual(&self, instance: &StructuredObjectInstance, path: &ComponentPath) -> Option<Actual> {
        match paths::lookup(&[&instance.components], path)? {
            Found::One(item) => self.item_type(item).map(Actual::Scalar),
            Found::Many(items) => items
                .into_iter()
                .map(|item| self.item_type(item))
                .collect::<Option<_>>()
                .map(Actual::List),
        }
    }

    /// Returns the type of the value held by `item`; names are looked up as symbols.
    fn item_type(&self, item: &Item) -> Option<TypeSpec> {
        match item {
            Item::Typename(ty) => Some(ty.clone()),
            Item::Expression(node) => node.ty().cloned(),
            Item::Name(name) => self.context.lookup(self.scope, name).cloned(),
            _ => None,
        }
    }

    /// Returns `true` if `actual` satisfies `expected`, binding generics as it goes.
    fn unify(
        &self,
        expected: &ConfigTypeSpec,
        actual: &Actual,
        instance: &StructuredObjectInstance,
        generics: &mut Bindings,
    ) -> bool {
        match (expected, actual) {
            (
                ConfigTypeSpec::Attributes { component, path }
                | ConfigTypeSpec::AttributesMapFull { component, path }
                | ConfigTypeSpec::Field { component, path },
                _,
            ) => {
                let full = matches!(expected, ConfigTypeSpec::AttributesMapFull { .. });
                self.attribute_lookup(component, path, full, instance)
                    .is_some_and(|found| found.matches(actual))
            }
            (_, Actual::Scalar(ty)) => self.unify_scalar(expected, ty, instance, generics),
            (_, Actual::List(_)) => false,
        }
    }

    /// Unifies `expected` with the single type `actual`.
    fn unify_scalar(
        &self,
        expected: &ConfigTypeSpec,
        actual: &TypeSpec,
        instance: &StructuredObjectInstance,
        generics: &mut Bindings,
    ) -> bool {
        match expected {
            ConfigTypeSpec::Concrete { name, subtypes } => {
                *name == actual.name
                    && subtypes.len() == actual.arity()
                    && subtypes
                        .iter()
                        .zip(&actual.subtypes)
                        .all(|(expected, actual)| self.unify_scalar(expected, actual, instance, generics))
            }
            ConfigTypeSpec::Generic(generic) => match generics.get(generic) {
                Some(bound) => bound.matches(actual),
                None => {
                    generics.insert(generic.clone(), actual.clone());
                    true
                }
            },
            ConfigTypeSpec::Component(path) => self
                .actual(instance, path)
                .is_some_and(|found| found.matches(&Actual::Scalar(actual.clone()))),
            other => self.unify(other, &Actual::Scalar(actual.clone()), instance, generics),
        }
    }

    /// Walks the attribute `path` from the type of `component`.
    ///
    /// A `$`-segment maps every name it holds to the attribute of that name; with
    /// `full` set, it must name every attribute of the type exactly once. A list
    /// attribute can only end the path.
    fn attribute_lookup(
        &self,
        component: &str,
        path: &[PathSegment],
        full: bool,
        instance: &StructuredObjectInstance,
    ) -> Option<Actual> {
        let head = ComponentPath(vec![component.to_string()]);
        let mut ty = match paths::lookup(&[&instance.components], &head)? {
            Found::One(item) => self.item_type(item)?,
            Found::Many(_) => return None,
        };

        for (index, segment) in path.iter().enumerate() {
            let last = index + 1 == path.len();
            match segment {
                PathSegment::Attribute(name) => match ty.attributes.get(name)? {
                    Attribute::Single(inner) => ty = inner.clone(),
                    Attribute::List(types) if last => return Some(Actual::List(types.clone())),
                    Attribute::List(_) => return None,
                },
                PathSegment::Component(reference) => {
                    let found = paths::lookup(&[&instance.components], reference)?;
                    let names = found
                        .items()
                        .into_iter()
                        .map(|item| match item {
                            Item::Name(name) => Some(name.as_str()),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>()?;

                    if full {
                        let distinct: BTreeSet<&str> = names.iter().copied().collect();
                        let covered = distinct.len() == names.len()
                            && distinct.len() == ty.attributes.len()
                            && ty.attributes.keys().all(|key| distinct.contains(key.as_str()));
                        if !covered {
                            return None;
                        }
                    }

                    let types = names
                        .iter()
                        .map(|name| match ty.attributes.get(*name)? {
                            Attribute::Single(inner) => Some(inner.clone()),
                            Attribute::List(_) => None,
                        })
                        .collect::<Option<Vec<_>>>()?;

                    return match found {
                        Found::One(_) => types.into_iter().next().map(Actual::Scalar),
                        Found::Many(_) => Some(Actual::List(types)),
                    };
                }
            }
        }

        Some(Actual::Scalar(ty))
    }

    /// Builds the concrete type described by `spec` from the components of
    /// `instance` and the bound `generics`.
    ///
    /// Names held by components stand for the type of that name, as in the type
    /// declared by `struct $name`.
    pub fn realize(
        &self,
        spec: &ConfigTypeSpec,
        instance: &StructuredObjectInstance,
        generics: &Bindings,
    ) -> Result<TypeSpec, ParseError> {
        let invalid = |reason: &str| {
            ParseError::new(
                ErrorKind::InvalidType,
                format!("cannot realize `{spec}` in `{}`: {reason}", instance.name()),
            )
            .located(instance.location)
        };

        match spec {
            ConfigTypeSpec::Concrete { name, subtypes } => {
                let subtypes = subtypes
                    .iter()
                    .map(|subtype| self.realize(subtype, instance, generics))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TypeSpec::generic(name, subtypes))
            }
            ConfigTypeSpec::Generic(generic) => generics
                .get(generic)
                .cloned()
                .ok_or_else(|| invalid(&format!("`{generic}` is unbound"))),
            ConfigTypeSpec::Component(path) => match paths::lookup(&[&instance.components], path) {
                Some(Found::One(Item::Name(name))) => Ok(TypeSpec::named(name)),
                Some(Found::One(item)) => self
                    .item_type(item)
                    .ok_or_else(|| invalid(&format!("`{path}` has no type"))),
                Some(Found::Many(_)) => Err(invalid(&format!("`{path}` holds a list"))),
                None => Err(invalid(&format!("`{path}` was not parsed"))),
            },
            ConfigTypeSpec::Attributes { component, path }
            | ConfigTypeSpec::AttributesMapFull { component, path }
            | ConfigTypeSpec::Field { component, path } => {
                let full = matches!(spec, ConfigTypeSpec::AttributesMapFull { .. });
                match self.attribute_lookup(component, path, full, instance) {
                    Some(Actual::Scalar(ty)) => Ok(ty),
                    Some(Actual::List(_)) => Err(invalid("the attribute is a list")),
                    None => Err(invalid("no such attribute")),
                }
            }
        }
    }
}
