//! Concrete types, as attached to symbols and expressions.

use std::{collections::BTreeMap, fmt::Display};

/// The name of the wrapper type under which user-defined types are registered.
///
/// Declaring `struct Point { ... }` registers the symbol `Point` with the type
/// `$type<Point>`, so that a [`Typename`](super::structure::ComponentKind::Typename)
/// component can tell type names apart from ordinary variables.
pub const TYPE_WRAPPER: &str = "$type";

/// The value of one entry in a [`TypeSpec`]'s attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// A single type, e.g. the type of a struct field.
    Single(TypeSpec),
    /// A list of types, e.g. the parameter types of a function.
    List(Vec<TypeSpec>),
}

impl Attribute {
    /// Returns `true` if `self` and `other` have the same shape and matching types.
    pub fn matches(&self, other: &Attribute) -> bool {
        match (self, other) {
            (Self::Single(left), Self::Single(right)) => left.matches(right),
            (Self::List(left), Self::List(right)) => {
                left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.matches(r))
            }
            _ => false,
        }
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(ty) => write!(f, "{ty}"),
            Self::List(types) => write!(f, "[{}]", join(types)),
        }
    }
}

/// A concrete type: a name, ordered type arguments and an attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// The name of this type.
    pub name: String,
    /// The type arguments of this type; its arity is their count.
    pub subtypes: Vec<TypeSpec>,
    /// Named member types, e.g. struct fields.
    pub attributes: BTreeMap<String, Attribute>,
    /// The name of the production that declared this type, if any.
    pub associated_structure: Option<String>,
}

impl TypeSpec {
    /// Constructs a type with no arguments or attributes.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subtypes: Vec::new(),
            attributes: BTreeMap::new(),
            associated_structure: None,
        }
    }

    /// Constructs a type with the given type arguments.
    pub fn generic(name: impl Into<String>, subtypes: Vec<TypeSpec>) -> Self {
        Self {
            subtypes,
            ..Self::named(name)
        }
    }

    /// Returns `self` with the given attribute table.
    pub fn with_attributes(mut self, attributes: BTreeMap<String, Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Returns the number of type arguments of `self`.
    #[inline(always)]
    pub fn arity(&self) -> usize {
        self.subtypes.len()
    }

    /// Returns `true` if `self` is a `$type` wrapper around a user-defined type.
    #[inline(always)]
    pub fn is_type_wrapper(&self) -> bool {
        self.name == TYPE_WRAPPER
    }

    /// Unwraps a `$type` wrapper into the type it declares.
    ///
    /// The declared type inherits the wrapper's attributes and associated structure,
    /// so that field lookups work on values of that type.
    pub fn declared_type(&self) -> Option<TypeSpec> {
        match (self.is_type_wrapper(), self.subtypes.first()) {
            (true, Some(inner)) => Some(TypeSpec {
                attributes: self.attributes.clone(),
                associated_structure: self.associated_structure.clone(),
                ..inner.clone()
            }),
            _ => None,
        }
    }

    /// Structural type equality: names, arities, subtypes and attributes must all match.
    ///
    /// The associated structure is provenance, not identity, and is ignored.
    pub fn matches(&self, other: &TypeSpec) -> bool {
        self.name == other.name
            && self.arity() == other.arity()
            && self
                .subtypes
                .iter()
                .zip(&other.subtypes)
                .all(|(left, right)| left.matches(right))
            && self.attributes.len() == other.attributes.len()
            && self.attributes.iter().all(|(name, attribute)| {
                other
                    .attributes
                    .get(name)
                    .is_some_and(|theirs| attribute.matches(theirs))
            })
    }
}

impl Display for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.subtypes.is_empty() {
            true => write!(f, "{}", self.name),
            false => write!(f, "{}<{}>", self.name, join(&self.subtypes)),
        }
    }
}

/// Joins the display forms of `types` with commas.
pub(crate) fn join(types: &[TypeSpec]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
