//! The component sequence of a production and the per-variable component specs.

use std::{collections::BTreeMap, fmt::Display, rc::Rc};

use serde::Deserialize;

use super::{config::Reference, filter::StructureFilter, object::StructuredObject};

/// One element of a production's component sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureComponent {
    /// Literal source text, compared token by token.
    Literal(String),
    /// A slot filled during parsing, described by the [`ComponentSpec`] of the same name.
    Variable(String),
}

impl StructureComponent {
    /// Returns the literal text of `self`, if it is a literal.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Self::Literal(text) => Some(text),
            Self::Variable(_) => None,
        }
    }
}

impl Display for StructureComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(text) if text.starts_with('$') => write!(f, "${text}"),
            Self::Literal(text) => write!(f, "{text}"),
            Self::Variable(name) => write!(f, "${name}"),
        }
    }
}

/// Splits a structure string like `$left + $right` into its components.
///
/// Components are separated by whitespace; `$name` is a variable and `$$text` is the
/// literal `$text`.
pub fn parse_structure(structure: &str) -> Vec<StructureComponent> {
    structure
        .split_whitespace()
        .map(|word| match word.strip_prefix('$') {
            Some(escaped) if escaped.starts_with('$') => {
                StructureComponent::Literal(escaped.to_string())
            }
            Some(name) if !name.is_empty() => StructureComponent::Variable(name.to_string()),
            _ => StructureComponent::Literal(word.to_string()),
        })
        .collect()
}

/// Which declarations a [`ComponentKind::Name`] component accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamePolicy {
    /// The name must be visible from the current scope.
    #[default]
    ExistingGlobal,
    /// The name must be declared in the current scope itself.
    ExistingLocal,
    /// The name must not be visible from the current scope.
    NewGlobal,
    /// The name must not be declared in the current scope itself.
    NewLocal,
    /// Any identifier.
    Any,
}

/// Where the statements of an [`ComponentKind::Expressions`] component are declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// A fresh child scope of the current scope, retained in the parsed item.
    Local,
    /// The current scope.
    #[default]
    Global,
}

/// A symbol seeded into a statement block before its statements are parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInsertion {
    /// The type (or types, through a repeated element) to declare.
    pub ty: Reference,
    /// The name (or names, through a repeated element) to declare.
    pub name: Reference,
}

/// The options of an [`ComponentKind::Expressions`] component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionsSpec {
    /// Whether the block opens a child scope.
    pub scope: ScopeMode,
    /// The productions allowed inside the block.
    pub filter: StructureFilter,
    /// Symbols seeded into the block's scope from sibling components.
    pub insert_scope: Vec<ScopeInsertion>,
}

/// The options of an [`ComponentKind::RepeatedElement`] component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatedElement {
    /// The anonymous production parsed for every element.
    pub element: Rc<StructuredObject>,
    /// The literal between elements.
    pub separator: String,
}

/// A per-call change to one component of an inlined production.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentOverride {
    /// Replaces the policy of a name component.
    pub policy: Option<NamePolicy>,
    /// Replaces the scope mode of a block component.
    pub scope: Option<ScopeMode>,
    /// Replaces the filter of a block component.
    pub filter: Option<StructureFilter>,
    /// Replaces the scope insertions of a block component.
    pub insert_scope: Option<Vec<ScopeInsertion>>,
}

/// The options of a [`ComponentKind::Structure`] component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureRef {
    /// The name of the inlined production.
    pub name: String,
    /// Changes applied to the inlined production's components for this use only,
    /// keyed by the variable name inside that production.
    pub overrides: BTreeMap<String, ComponentOverride>,
}

/// The base kind of a variable component, with its kind-specific options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    /// One token naming a primitive or declared type.
    Typename,
    /// One identifier, checked against a declaration policy.
    Name(NamePolicy),
    /// One expression, parsed by the expression engine.
    Expression,
    /// A block of statements ending before a terminator literal.
    Expressions(ExpressionsSpec),
    /// Zero or more copies of an inner structure, ending before a terminator literal.
    RepeatedElement(RepeatedElement),
    /// Another named production, inlined.
    Structure(StructureRef),
}

impl ComponentKind {
    /// Returns a short name for the kind of `self`.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Typename => "typename",
            Self::Name(_) => "name",
            Self::Expression => "expression",
            Self::Expressions(_) => "expressions",
            Self::RepeatedElement(_) => "repeated element",
            Self::Structure(_) => "structure",
        }
    }
}

/// The metadata of one variable component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    /// The key under which the parsed value is stored.
    pub field: String,
    /// What the component parses.
    pub kind: ComponentKind,
}

impl ComponentSpec {
    /// Returns `true` if this component holds an expression.
    #[inline(always)]
    pub fn is_expression(&self) -> bool {
        matches!(self.kind, ComponentKind::Expression)
    }

    /// Returns a copy of `self` with `patch` applied.
    ///
    /// Options that do not apply to the kind of `self` are ignored.
    pub fn patched(&self, patch: &ComponentOverride) -> ComponentSpec {
        let kind = match &self.kind {
            ComponentKind::Name(policy) => ComponentKind::Name(patch.policy.unwrap_or(*policy)),
            ComponentKind::Expressions(spec) => ComponentKind::Expressions(ExpressionsSpec {
                scope: patch.scope.unwrap_or(spec.scope),
                filter: patch.filter.clone().unwrap_or_else(|| spec.filter.clone()),
                insert_scope: patch
                    .insert_scope
                    .clone()
                    .unwrap_or_else(|| spec.insert_scope.clone()),
            }),
            other => other.clone(),
        };

        ComponentSpec {
            field: self.field.clone(),
            kind,
        }
    }
}
