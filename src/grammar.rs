//! Grammar definitions: the productions, primitive types and separators that drive
//! the parser.
//!
//! A grammar is loaded from JSON (see [`definition`]) and validated into a
//! [`GrammarSpec`], which is immutable for the rest of its life. Productions are
//! shared through [`Rc`], and inlined structures refer to each other by name, so a
//! grammar may be freely recursive.

use std::{collections::BTreeMap, rc::Rc, str::FromStr};

use thiserror::Error;

use self::{config::TypeSyntaxError, definition::GrammarDef, object::StructuredObject};

pub mod config;
pub mod definition;
pub mod filter;
pub mod object;
pub mod structure;
pub mod types;

/// The error produced when a grammar cannot be loaded.
#[derive(Debug, Error)]
pub enum GrammarError {
    /// The document is not valid grammar JSON.
    #[error("malformed grammar: {0}")]
    Json(#[from] serde_json::Error),
    /// A type string or component path is malformed.
    #[error(transparent)]
    TypeSyntax(#[from] TypeSyntaxError),
    /// Two productions share a name.
    #[error("structure `{0}` is declared twice")]
    DuplicateStructure(String),
    /// Two primitive types claim the same literal format or keyword.
    #[error("initializer `{0}` is declared twice")]
    DuplicateInitializer(String),
    /// A structure string names a variable with no component spec.
    #[error("structure `{structure}` uses `${variable}` without a component spec")]
    MissingComponent {
        /// The offending production.
        structure: String,
        /// The unspecified variable.
        variable: String,
    },
    /// An inlined structure names a production that does not exist.
    #[error("structure `{structure}` refers to unknown structure `{target}`")]
    UnknownStructure {
        /// The offending production.
        structure: String,
        /// The missing production.
        target: String,
    },
    /// A block or repeated element is not followed by a literal.
    #[error("component `{variable}` of `{structure}` must be followed by a terminator literal")]
    MissingTerminator {
        /// The offending production.
        structure: String,
        /// The unterminated variable.
        variable: String,
    },
    /// An overload does not type exactly the operator's fields.
    #[error("operator `{structure}` has an overload whose fields differ from {expected:?}")]
    OverloadFields {
        /// The offending operator.
        structure: String,
        /// The declared operator fields.
        expected: Vec<String>,
    },
    /// An operator field names no component.
    #[error("operator `{structure}` names unknown field `{field}`")]
    UnknownField {
        /// The offending operator.
        structure: String,
        /// The unknown field path.
        field: String,
    },
}

/// A built-in type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveType {
    /// The type name, reserved by the lexer.
    pub name: String,
    /// The variable literal format, e.g. `$int`.
    pub initialize: Option<String>,
    /// The keyword literals of this type.
    pub keywords: Vec<String>,
}

/// How a literal initializer is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitializerKind {
    /// A class of tokens, such as every integer (`$int`).
    Variable,
    /// One exact keyword, such as `true`.
    Literal,
}

/// The primitive type produced by a literal token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializerFormat {
    /// The name of the primitive type.
    pub ty: String,
    /// Whether the format is a token class or a keyword.
    pub kind: InitializerKind,
}

/// A validated grammar.
#[derive(Debug, Clone)]
pub struct GrammarSpec {
    /// The built-in types, in declaration order.
    pub(crate) primitives: Vec<PrimitiveType>,
    /// The productions, in declaration order.
    pub(crate) structures: Vec<Rc<StructuredObject>>,
    /// Literal formats and keywords, mapped to the types they produce.
    pub(crate) initializers: BTreeMap<String, InitializerFormat>,
    /// The statement separators.
    pub(crate) separators: Vec<String>,
}

impl GrammarSpec {
    /// Loads and validates a grammar from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, GrammarError> {
        serde_json::from_str::<GrammarDef>(json)?.build()
    }

    /// Returns the productions in declaration order.
    pub fn structures(&self) -> impl Iterator<Item = &Rc<StructuredObject>> {
        self.structures.iter()
    }

    /// Returns the production called `name`.
    pub fn structure(&self, name: &str) -> Option<&Rc<StructuredObject>> {
        self.structures.iter().find(|object| object.name == name)
    }

    /// Returns the built-in types.
    pub fn primitives(&self) -> &[PrimitiveType] {
        &self.primitives
    }

    /// Returns the names of the built-in types.
    pub fn primitive_names(&self) -> impl Iterator<Item = &str> {
        self.primitives.iter().map(|primitive| primitive.name.as_str())
    }

    /// Returns `true` if `name` is a built-in type.
    pub fn is_primitive(&self, name: &str) -> bool {
        self.primitive_names().any(|primitive| primitive == name)
    }

    /// Returns every keyword literal of every built-in type.
    pub fn value_keywords(&self) -> impl Iterator<Item = &str> {
        self.primitives
            .iter()
            .flat_map(|primitive| primitive.keywords.iter().map(String::as_str))
    }

    /// Returns the statement separators.
    #[inline(always)]
    pub fn separators(&self) -> &[String] {
        &self.separators
    }

    /// Returns the primitive type produced by the literal format or keyword `format`.
    pub fn initializer(&self, format: &str) -> Option<&InitializerFormat> {
        self.initializers.get(format)
    }
}

impl FromStr for GrammarSpec {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json(s)
    }
}

sa::assert_impl_all!(GrammarError: std::error::Error, Send, Sync);


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_standard_grammar() {
        let grammar = fixtures::standard();

        assert!(grammar.is_primitive("int"));
        assert!(!grammar.is_primitive("Point"));
        assert_eq!(
            grammar.value_keywords().collect::<Vec<_>>(),
            vec!["true", "false"]
        );
        assert_eq!(grammar.separators(), [";".to_string()]);
        assert_eq!(
            grammar.initializer("$float").map(|format| format.ty.as_str()),
            Some("float")
        );

        // declaration order is preserved
        let names: Vec<_> = grammar.structures().map(|object| object.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"var_decl"));
        assert!(grammar.structure("function_def").is_some());
    }

    #[test]
    fn check_repeated_elements_are_named_after_their_owner() {
        let grammar = fixtures::standard();
        let function = grammar.structure("function_def").unwrap();
        let params = function.spec("params").unwrap();

        match &params.kind {
            structure::ComponentKind::RepeatedElement(repeated) => {
                assert_eq!(repeated.element.name, "function_def.params");
                assert_eq!(repeated.separator, ",");
                assert!(repeated.element.dependent);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn check_grammar_from_str() {
        let grammar: Result<GrammarSpec, _> = r#"{"structures": []}"#.parse();
        assert_eq!(grammar.unwrap().structures().count(), 0);
        assert!("[]".parse::<GrammarSpec>().is_err());
    }
}
