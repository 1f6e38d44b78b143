//! Declared types and component references, as written in a grammar.
//!
//! # Grammar
//! Type strings appear in operator overloads and declaration directives. They are
//! parsed with [`nom`] into [`ConfigTypeSpec`]s according to the following grammar.
//!
//! ```raw
//! config ::=
//!       `$typename_attributes_map_full<` ident `>` attribute-path
//!     | `$typename_attributes<` ident `>` attribute-path
//!     | `$typename_field<` ident `>` attribute-path
//!     | `$typename<` ident `>`
//!     | `$` component-path
//!     | ident [ `<` config { `,` config } `>` ]
//!
//! attribute-path ::= `.` segment { `.` segment }
//! segment        ::= ident | `$` component-path
//! component-path ::= ident { `.` ident }
//! ```
//!
//! A `$`-segment swallows the rest of the path, so it can only appear last.

use std::{fmt::Display, str::FromStr};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::{opt, recognize},
    multi::{many0_count, many1, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use nom_supreme::{
    error::ErrorTree,
    final_parser::{final_parser, Location},
    ParserExt,
};
use thiserror::Error;

/// The error produced when a type string or component path cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid type string {input:?}:\n{trace}")]
pub struct TypeSyntaxError {
    /// The string that failed to parse.
    pub input: String,
    /// The rendered parser error tree.
    pub trace: String,
}

/// A dotted path naming a parsed component, e.g. `params.type`.
///
/// The first segment names a component of the instance being inspected; each
/// further segment descends into a nested structure or into every element of a
/// repeated element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentPath(pub Vec<String>);

impl ComponentPath {
    /// Returns the component named by the first segment of `self`.
    pub fn head(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Returns every segment after the first.
    pub fn tail(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }
}

impl Display for ComponentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for ComponentPath {
    type Err = TypeSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        final_parser(component_path)(s).map_err(|err: ErrorTree<Location>| syntax_error(s, err))
    }
}

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A fixed attribute name.
    Attribute(String),
    /// The name (or names, through a repeated element) held by a parsed component.
    Component(ComponentPath),
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attribute(name) => write!(f, "{name}"),
            Self::Component(path) => write!(f, "${path}"),
        }
    }
}

/// A type as declared in a grammar, possibly referring to parsed components or to
/// generic placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigTypeSpec {
    /// A named type with type arguments, e.g. `int` or `function<$type>`.
    Concrete {
        /// The name of the type.
        name: String,
        /// Its declared type arguments.
        subtypes: Vec<ConfigTypeSpec>,
    },
    /// `$typename<G>`: binds the generic `G` on first use.
    Generic(String),
    /// `$field`: the type (or name) held by a parsed component.
    Component(ComponentPath),
    /// `$typename_attributes<inner>.path`: an attribute of `inner`'s type.
    Attributes {
        /// The component whose type is inspected.
        component: String,
        /// The attribute path walked from that type.
        path: Vec<PathSegment>,
    },
    /// `$typename_attributes_map_full<inner>.path`: like
    /// [`ConfigTypeSpec::Attributes`], but the path must name every attribute.
    AttributesMapFull {
        /// The component whose type is inspected.
        component: String,
        /// The attribute path walked from that type.
        path: Vec<PathSegment>,
    },
    /// `$typename_field<inner>.path`: an attribute lookup used in return position.
    Field {
        /// The component whose type is inspected.
        component: String,
        /// The attribute path walked from that type.
        path: Vec<PathSegment>,
    },
}

impl ConfigTypeSpec {
    /// Constructs a concrete type with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Concrete {
            name: name.into(),
            subtypes: Vec::new(),
        }
    }
}

impl FromStr for ConfigTypeSpec {
    type Err = TypeSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        final_parser(config)(s).map_err(|err: ErrorTree<Location>| syntax_error(s, err))
    }
}

impl Display for ConfigTypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = |segments: &[PathSegment]| {
            segments
                .iter()
                .map(|segment| format!(".{segment}"))
                .collect::<String>()
        };

        match self {
            Self::Concrete { name, subtypes } if subtypes.is_empty() => write!(f, "{name}"),
            Self::Concrete { name, subtypes } => write!(
                f,
                "{name}<{}>",
                subtypes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Generic(name) => write!(f, "$typename<{name}>"),
            Self::Component(component) => write!(f, "${component}"),
            Self::Attributes { component, path: p } => {
                write!(f, "$typename_attributes<{component}>{}", path(p))
            }
            Self::AttributesMapFull { component, path: p } => {
                write!(f, "$typename_attributes_map_full<{component}>{}", path(p))
            }
            Self::Field { component, path: p } => {
                write!(f, "$typename_field<{component}>{}", path(p))
            }
        }
    }
}

/// Either a literal string or a reference to a parsed component, as used for the
/// names and types in declaration directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `$path`: the value held by a parsed component.
    Component(ComponentPath),
    /// Any string not starting with `$`.
    Literal(String),
}

impl FromStr for Reference {
    type Err = TypeSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('$') {
            Some(path) => Ok(Self::Component(path.parse()?)),
            None => Ok(Self::Literal(s.to_string())),
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Component(path) => write!(f, "${path}"),
            Self::Literal(text) => write!(f, "{text}"),
        }
    }
}

/// Builds a [`TypeSyntaxError`] for `input` from a parser error tree.
fn syntax_error(input: &str, err: ErrorTree<Location>) -> TypeSyntaxError {
    TypeSyntaxError {
        input: input.to_string(),
        trace: err.to_string(),
    }
}

/// The return type of the parsers in this module.
type ConfigResult<'src, T> = IResult<&'src str, T, ErrorTree<&'src str>>;

/// Parses an identifier.
fn identifier(input: &str) -> ConfigResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .context("identifier")
    .parse(input)
}

/// Parses a dotted [`ComponentPath`].
fn component_path(input: &str) -> ConfigResult<'_, ComponentPath> {
    separated_list1(char('.'), identifier)
        .map(|segments| ComponentPath(segments.into_iter().map(String::from).collect()))
        .parse(input)
}

/// Parses one non-empty attribute path, including its leading `.`.
fn attribute_path(input: &str) -> ConfigResult<'_, Vec<PathSegment>> {
    many1(preceded(
        char('.'),
        alt((
            preceded(char('$'), component_path).map(PathSegment::Component),
            identifier.map(|name| PathSegment::Attribute(name.to_string())),
        )),
    ))
    .context("attribute path")
    .parse(input)
}

/// Returns a parser for `keyword<inner>`, yielding `inner`.
fn angled<'src>(keyword: &'static str) -> impl FnMut(&'src str) -> ConfigResult<'src, String> {
    move |input| {
        delimited(pair(tag(keyword), char('<')), identifier, char('>').cut())
            .map(String::from)
            .parse(input)
    }
}

/// Parses a [`ConfigTypeSpec`].
fn config(input: &str) -> ConfigResult<'_, ConfigTypeSpec> {
    alt((
        pair(angled("$typename_attributes_map_full"), attribute_path)
            .map(|(component, path)| ConfigTypeSpec::AttributesMapFull { component, path }),
        pair(angled("$typename_attributes"), attribute_path)
            .map(|(component, path)| ConfigTypeSpec::Attributes { component, path }),
        pair(angled("$typename_field"), attribute_path)
            .map(|(component, path)| ConfigTypeSpec::Field { component, path }),
        angled("$typename").map(ConfigTypeSpec::Generic),
        preceded(char('$'), component_path).map(ConfigTypeSpec::Component),
        pair(
            identifier,
            opt(delimited(
                char('<'),
                separated_list1(delimited(multispace0, char(','), multispace0), config),
                char('>'),
            )),
        )
        .map(|(name, subtypes)| ConfigTypeSpec::Concrete {
            name: name.to_string(),
            subtypes: subtypes.unwrap_or_default(),
        }),
    ))
    .context("type")
    .parse(input)
}
