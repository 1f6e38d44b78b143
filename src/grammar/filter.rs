//! Restrictions on which productions may be matched at a given point.

use super::object::{Directive, OperatorShape, StructuredObject};

/// One predicate over productions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    /// The production has this name.
    Structure(String),
    /// The production carries this directive.
    Contains(Directive),
    /// The production does not carry this directive.
    Excludes(Directive),
    /// The production is an operator of this shape.
    OperatorType(OperatorShape),
    /// Every inner rule holds.
    And(Vec<FilterRule>),
}

impl FilterRule {
    /// Returns `true` if `object` satisfies `self`.
    pub fn matches(&self, object: &StructuredObject) -> bool {
        match self {
            Self::Structure(name) => object.name == *name,
            Self::Contains(directive) => object.has(*directive),
            Self::Excludes(directive) => !object.has(*directive),
            Self::OperatorType(shape) => object.shape() == Some(*shape),
            Self::And(rules) => rules.iter().all(|rule| rule.matches(object)),
        }
    }

    /// Returns `true` if `self` explicitly requires a production named `name`.
    fn names(&self, name: &str) -> bool {
        match self {
            Self::Structure(target) => target == name,
            Self::And(rules) => rules.iter().any(|rule| rule.names(name)),
            _ => false,
        }
    }
}

/// The set of productions (and whether bare expressions) allowed at some point.
///
/// A filter either allows everything, or allows exactly the productions matching at
/// least one of its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureFilter {
    /// `None` allows every production.
    rules: Option<Vec<FilterRule>>,
    /// Whether a bare expression may stand in for a production.
    expressions: bool,
}

impl Default for StructureFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl StructureFilter {
    /// Allows every production and bare expressions.
    pub fn all() -> Self {
        Self {
            rules: None,
            expressions: true,
        }
    }

    /// Allows bare expressions only.
    pub fn expressions_only() -> Self {
        Self {
            rules: Some(Vec::new()),
            expressions: true,
        }
    }

    /// Allows the productions matching any of `rules`, and bare expressions if
    /// `expressions` is set.
    pub fn rules(rules: Vec<FilterRule>, expressions: bool) -> Self {
        Self {
            rules: Some(rules),
            expressions,
        }
    }

    /// Allows operators of the given shapes only.
    pub fn operators(shapes: &[OperatorShape]) -> Self {
        Self::rules(
            shapes.iter().copied().map(FilterRule::OperatorType).collect(),
            true,
        )
    }

    /// Returns `true` if `self` restricts productions at all.
    #[inline(always)]
    pub fn is_filtering(&self) -> bool {
        self.rules.is_some()
    }

    /// Returns `true` if bare expressions are allowed.
    #[inline(always)]
    pub fn allows_expressions(&self) -> bool {
        self.expressions
    }

    /// Returns `true` if `object` may be matched under `self`.
    ///
    /// Dependent productions are only allowed when a rule names them explicitly, and
    /// expression-only productions only when expressions are allowed.
    pub fn allows(&self, object: &StructuredObject) -> bool {
        if object.expression_only && !self.expressions {
            return false;
        }

        match &self.rules {
            None => !object.dependent,
            Some(rules) => {
                (!object.dependent || rules.iter().any(|rule| rule.names(&object.name)))
                    && rules.iter().any(|rule| rule.matches(object))
            }
        }
    }
}
