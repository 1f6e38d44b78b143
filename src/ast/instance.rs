//! Parsed productions and the values held by their components.

use std::{collections::BTreeMap, fmt::Display, rc::Rc};

use crate::{
    context::ScopeId,
    error::Location,
    grammar::{
        object::{OperatorShape, StructuredObject},
        structure::StructureComponent,
        types::TypeSpec,
    },
    lexer::token::Token,
};

/// A literal or identifier leaf of an expression, with its resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueToken {
    /// The source token.
    pub token: Token,
    /// The type of the literal, or the declared type of the identifier.
    pub ty: TypeSpec,
}

/// An expression or statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A literal or identifier.
    Value(ValueToken),
    /// A parsed production; an operator when its `operator` fields are set.
    Instance(Box<StructuredObjectInstance>),
}

impl Node {
    /// Returns the type of the value of `self`, if it has one.
    ///
    /// Operators have a type once they have been resolved; other productions never do.
    pub fn ty(&self) -> Option<&TypeSpec> {
        match self {
            Self::Value(value) => Some(&value.ty),
            Self::Instance(instance) => instance.result_type(),
        }
    }

    /// Returns the position of the first token of `self`.
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Value(value) => Some((&value.token).into()),
            Self::Instance(instance) => instance.location,
        }
    }

    /// Returns the parsed production, if `self` is not a leaf.
    pub fn instance(&self) -> Option<&StructuredObjectInstance> {
        match self {
            Self::Instance(instance) => Some(instance),
            Self::Value(_) => None,
        }
    }

    /// Returns the number of nodes in the tree rooted at `self`.
    pub fn count_nodes(&self) -> usize {
        match self {
            Self::Value(_) => 1,
            Self::Instance(instance) => instance.count_nodes(),
        }
    }
}

impl From<StructuredObjectInstance> for Node {
    fn from(instance: StructuredObjectInstance) -> Self {
        Self::Instance(Box::new(instance))
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{}", value.token.text),
            Self::Instance(instance) => write!(f, "{instance}"),
        }
    }
}

/// The operator-specific state of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorFields {
    /// The shape of the operator.
    pub shape: OperatorShape,
    /// The type selected by overload resolution.
    pub result_type: Option<TypeSpec>,
}

/// The value of one parsed variable component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A type name, resolved.
    Typename(TypeSpec),
    /// An identifier.
    Name(String),
    /// One expression.
    Expression(Node),
    /// A block of statements, with its own scope if it opened one.
    Expressions {
        /// The statements, in source order.
        nodes: Vec<Node>,
        /// The retained child scope of a local block.
        scope: Option<ScopeId>,
    },
    /// The elements of a repeated element, possibly none.
    RepeatedElement(Vec<StructuredObjectInstance>),
    /// An inlined production.
    Structure(Box<StructuredObjectInstance>),
}

impl Item {
    /// Returns the number of nodes held by `self`.
    fn count_nodes(&self) -> usize {
        match self {
            Self::Typename(_) | Self::Name(_) => 0,
            Self::Expression(node) => node.count_nodes(),
            Self::Expressions { nodes, .. } => nodes.iter().map(Node::count_nodes).sum(),
            Self::RepeatedElement(elements) => elements
                .iter()
                .flat_map(|element| element.components.values())
                .map(Item::count_nodes)
                .sum(),
            Self::Structure(instance) => instance.count_nodes(),
        }
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Typename(ty) => write!(f, "{ty}"),
            Self::Name(name) => write!(f, "{name}"),
            Self::Expression(node) => write!(f, "{node}"),
            Self::Expressions { nodes, .. } => write!(
                f,
                "[{}]",
                nodes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Self::RepeatedElement(elements) => write!(
                f,
                "[{}]",
                elements
                    .iter()
                    .map(|element| format!("({})", element.fields()))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Self::Structure(instance) => write!(f, "{instance}"),
        }
    }
}

/// A parsed production: the production and one item per variable component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredObjectInstance {
    /// The production this instance was parsed from.
    pub production: Rc<StructuredObject>,
    /// The parsed items, keyed by component field.
    pub components: BTreeMap<String, Item>,
    /// Set when the instance was parsed as an operator.
    pub operator: Option<OperatorFields>,
    /// The position of the first token of the instance.
    pub location: Option<Location>,
}

impl StructuredObjectInstance {
    /// Constructs an empty instance of `production`.
    pub fn new(production: Rc<StructuredObject>, location: Option<Location>) -> Self {
        Self {
            production,
            components: BTreeMap::new(),
            operator: None,
            location,
        }
    }

    /// Returns the name of the production of `self`.
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.production.name
    }

    /// Returns the item stored under `field`.
    #[inline(always)]
    pub fn get(&self, field: &str) -> Option<&Item> {
        self.components.get(field)
    }

    /// Returns `true` once every variable component holds an item.
    pub fn is_complete(&self) -> bool {
        self.components.len() == self.production.field_count()
    }

    /// Returns the resolved type of `self`, if it is a resolved operator.
    pub fn result_type(&self) -> Option<&TypeSpec> {
        self.operator.as_ref()?.result_type.as_ref()
    }

    /// Returns the items of `self` in structure order, skipping unfilled fields.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.production
            .structure
            .iter()
            .filter_map(|component| match component {
                StructureComponent::Variable(variable) => self.production.spec(variable),
                StructureComponent::Literal(_) => None,
            })
            .filter_map(|spec| self.components.get(&spec.field))
    }

    /// Renders the items of `self` separated by spaces.
    fn fields(&self) -> String {
        self.items()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns the number of nodes in the tree rooted at `self`.
    pub fn count_nodes(&self) -> usize {
        1 + self.components.values().map(Item::count_nodes).sum::<usize>()
    }
}

impl Display for StructuredObjectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.components.is_empty() {
            true => write!(f, "({})", self.name()),
            false => write!(f, "({} {})", self.name(), self.fields()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar::fixtures, lexer::token::TokenKind};

    fn value(text: &str, kind: TokenKind, ty: &str) -> Node {
        Node::Value(ValueToken {
            token: Token::new(kind, text, 1, 1),
            ty: TypeSpec::named(ty),
        })
    }

    #[test]
    fn check_instance_display() {
        let grammar = fixtures::standard();
        let plus = grammar.structure("+").unwrap().clone();
        let times = grammar.structure("*").unwrap().clone();

        let mut product = StructuredObjectInstance::new(times, None);
        product
            .components
            .insert("left".to_string(), Item::Expression(value("4", TokenKind::Integer, "int")));
        product.components.insert(
            "right".to_string(),
            Item::Expression(value("6.5", TokenKind::Float, "float")),
        );

        let mut sum = StructuredObjectInstance::new(plus, None);
        sum.components
            .insert("right".to_string(), Item::Expression(product.into()));
        assert!(!sum.is_complete());
        sum.components
            .insert("left".to_string(), Item::Expression(value("5", TokenKind::Integer, "int")));
        assert!(sum.is_complete());

        // fields are rendered in structure order, not key order
        assert_eq!(sum.to_string(), "(+ 5 (* 4 6.5))");
        assert_eq!(sum.count_nodes(), 5);
        assert_eq!(sum.result_type(), None);
    }

    #[test]
    fn check_item_display() {
        let names = Item::Expressions {
            nodes: vec![value("a", TokenKind::Identifier, "int"), value("1", TokenKind::Integer, "int")],
            scope: None,
        };
        assert_eq!(names.to_string(), "[a 1]");
        assert_eq!(Item::RepeatedElement(Vec::new()).to_string(), "[]");
        assert_eq!(Item::Typename(TypeSpec::named("int")).to_string(), "int");
    }
}
