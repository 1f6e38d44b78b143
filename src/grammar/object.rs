//! Productions ("structured objects") and their declaration directives.

use std::{collections::BTreeMap, fmt::Display};

use serde::Deserialize;

use super::{
    config::{ComponentPath, ConfigTypeSpec, Reference},
    structure::{ComponentOverride, ComponentSpec, StructureComponent},
};

/// The directives a production may carry, as named by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// [`CreateVariable`].
    CreateVariable,
    /// [`CreateType`].
    CreateType,
    /// [`CreateOperator`].
    CreateOperator,
}

/// How operators of equal precedence group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Associativity {
    /// `a + b + c` is `(a + b) + c`.
    LeftToRight,
    /// `a ++ b ++ c` is `a ++ (b ++ c)`.
    RightToLeft,
    /// No grouping preference; behaves like [`Associativity::RightToLeft`] when splicing.
    #[default]
    None,
}

/// The shape of an operator, determined by which ends of its production hold
/// expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorShape {
    /// Expressions at both ends, e.g. `$left + $right`.
    Binary,
    /// An expression at the start only, e.g. `$left $right +`.
    UnaryLeft,
    /// An expression at the end only, e.g. `- $right`.
    UnaryRight,
    /// Expressions at neither end, e.g. `( $inside )`.
    Internal,
}

impl OperatorShape {
    /// Derives a shape from whether the first and last components are expressions.
    pub fn from_ends(first: bool, last: bool) -> Self {
        match (first, last) {
            (true, true) => Self::Binary,
            (true, false) => Self::UnaryLeft,
            (false, true) => Self::UnaryRight,
            (false, false) => Self::Internal,
        }
    }

    /// Returns `true` if operators of this shape consume an operand to their left.
    #[inline(always)]
    pub fn takes_left(&self) -> bool {
        matches!(self, Self::Binary | Self::UnaryLeft)
    }

    /// Returns `true` if operators of this shape end with an open expression slot.
    #[inline(always)]
    pub fn takes_right(&self) -> bool {
        matches!(self, Self::Binary | Self::UnaryRight)
    }
}

impl Display for OperatorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Binary => "binary",
                Self::UnaryLeft => "unary_left",
                Self::UnaryRight => "unary_right",
                Self::Internal => "internal",
            }
        )
    }
}

/// Where a [`CreateVariable`] registers its symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationScope {
    /// The scope the statement was parsed in.
    #[default]
    Local,
    /// The root scope.
    Global,
}

/// Declares a symbol when the production is matched as a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVariable {
    /// The declared name.
    pub name: Reference,
    /// The declared type.
    pub ty: ConfigTypeSpec,
    /// A type the declared type must match, e.g. that of an initializer.
    pub check_type: Option<ConfigTypeSpec>,
    /// Attributes attached to the declared type, read from parsed components.
    pub attributes: BTreeMap<String, ComponentPath>,
    /// Where the symbol is registered.
    pub scope: DeclarationScope,
}

/// Declares a type when the production is matched as a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateType {
    /// The declared type.
    pub ty: ConfigTypeSpec,
    /// Paths to local statement blocks whose declarations become the type's fields.
    pub fields_containers: Vec<ComponentPath>,
}

/// One signature of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorOverload {
    /// The declared type of every operator field, in the order of
    /// [`CreateOperator::fields`].
    pub fields: Vec<(ComponentPath, ConfigTypeSpec)>,
    /// The result type.
    pub returns: ConfigTypeSpec,
}

/// Marks a production as an operator usable inside expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOperator {
    /// The component paths whose types select an overload.
    pub fields: Vec<ComponentPath>,
    /// The binding strength; smaller numbers bind tighter.
    pub precedence: u32,
    /// Grouping of equal-precedence operators.
    pub associativity: Associativity,
    /// The signatures of this operator, tried in order.
    pub overloads: Vec<OperatorOverload>,
}

/// A named production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredObject {
    /// The name of this production.
    pub name: String,
    /// The component sequence.
    pub structure: Vec<StructureComponent>,
    /// The spec of every variable in `structure`, keyed by variable name.
    pub components: BTreeMap<String, ComponentSpec>,
    /// Declares a symbol on a statement-level match.
    pub create_variable: Option<CreateVariable>,
    /// Declares a type on a statement-level match.
    pub create_type: Option<CreateType>,
    /// Makes this production an operator.
    pub create_operator: Option<CreateOperator>,
    /// Only usable when a filter names it, e.g. inside another production.
    pub dependent: bool,
    /// Only usable where expressions are allowed.
    pub expression_only: bool,
}

impl StructuredObject {
    /// Returns the spec of the variable `name`.
    pub fn spec(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.get(name)
    }

    /// Returns `true` if `self` carries `directive`.
    pub fn has(&self, directive: Directive) -> bool {
        match directive {
            Directive::CreateVariable => self.create_variable.is_some(),
            Directive::CreateType => self.create_type.is_some(),
            Directive::CreateOperator => self.create_operator.is_some(),
        }
    }

    /// Returns `true` if `component` is a variable holding an expression.
    pub fn is_expression_slot(&self, component: &StructureComponent) -> bool {
        match component {
            StructureComponent::Variable(name) => {
                self.spec(name).is_some_and(ComponentSpec::is_expression)
            }
            StructureComponent::Literal(_) => false,
        }
    }

    /// Returns the operator shape of `self`, or `None` if it is not an operator.
    pub fn shape(&self) -> Option<OperatorShape> {
        self.create_operator.as_ref()?;
        let first = self.structure.first()?;
        let last = self.structure.last()?;
        Some(OperatorShape::from_ends(
            self.is_expression_slot(first),
            self.is_expression_slot(last),
        ))
    }

    /// Returns the number of expression slots at the start of the structure.
    pub fn leading_expressions(&self) -> usize {
        self.structure
            .iter()
            .take_while(|component| self.is_expression_slot(component))
            .count()
    }

    /// Returns the fields of the leading expression slots, in order.
    pub fn leading_fields(&self) -> Vec<&str> {
        self.structure
            .iter()
            .take(self.leading_expressions())
            .filter_map(|component| match component {
                StructureComponent::Variable(name) => self.spec(name).map(|spec| spec.field.as_str()),
                StructureComponent::Literal(_) => None,
            })
            .collect()
    }

    /// Returns the field of the trailing expression slot, if the structure ends in one.
    pub fn trailing_field(&self) -> Option<&str> {
        match self.structure.last()? {
            StructureComponent::Variable(name) => self
                .spec(name)
                .filter(|spec| spec.is_expression())
                .map(|spec| spec.field.as_str()),
            StructureComponent::Literal(_) => None,
        }
    }

    /// Returns the number of variable components, i.e. the fields a complete instance
    /// holds.
    pub fn field_count(&self) -> usize {
        self.structure
            .iter()
            .filter(|component| matches!(component, StructureComponent::Variable(_)))
            .count()
    }

    /// Returns a copy of `self` with the given per-component overrides applied.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, ComponentOverride>) -> Self {
        let mut patched = self.clone();
        for (variable, patch) in overrides {
            if let Some(spec) = patched.components.get_mut(variable) {
                *spec = spec.patched(patch);
            }
        }
        patched
    }

    /// Returns the precedence of `self`, if it is an operator.
    pub fn precedence(&self) -> Option<u32> {
        self.create_operator.as_ref().map(|op| op.precedence)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::grammar::structure::{parse_structure, ComponentKind};

    fn operator(structure: &str) -> StructuredObject {
        let components = parse_structure(structure)
            .into_iter()
            .filter_map(|component| match component {
                StructureComponent::Variable(name) => Some((
                    name.clone(),
                    ComponentSpec {
                        field: name,
                        kind: ComponentKind::Expression,
                    },
                )),
                StructureComponent::Literal(_) => None,
            })
            .collect();

        StructuredObject {
            name: structure.to_string(),
            structure: parse_structure(structure),
            components,
            create_variable: None,
            create_type: None,
            create_operator: Some(CreateOperator {
                fields: Vec::new(),
                precedence: 1,
                associativity: Associativity::LeftToRight,
                overloads: Vec::new(),
            }),
            dependent: false,
            expression_only: false,
        }
    }

    #[rstest]
    #[case("$left + $right", OperatorShape::Binary, 1)]
    #[case("$left $right +", OperatorShape::UnaryLeft, 2)]
    #[case("+ $left $right", OperatorShape::UnaryRight, 0)]
    #[case("( $expr )", OperatorShape::Internal, 0)]
    fn shape_is_determined_by_the_ends(
        #[case] structure: &str,
        #[case] shape: OperatorShape,
        #[case] leading: usize,
    ) {
        let object = operator(structure);
        assert_eq!(object.shape(), Some(shape));
        assert_eq!(object.leading_expressions(), leading);
    }

    #[test]
    fn check_field_helpers() {
        let ternary = operator("$cond ? $yes : $no");
        assert_eq!(ternary.field_count(), 3);
        assert_eq!(ternary.leading_fields(), vec!["cond"]);
        assert_eq!(ternary.trailing_field(), Some("no"));
        assert_eq!(operator("( $expr )").trailing_field(), None);

        let mut plain = operator("$a + $b");
        plain.create_operator = None;
        assert_eq!(plain.shape(), None);
    }
}
