//! The JSON form of a grammar and its conversion into a [`GrammarSpec`].
//!
//! Everything here is plain [`serde`] data. [`GrammarDef::build`] parses the embedded
//! structure and type strings, resolves repeated elements into anonymous productions
//! and validates the cross references that the parser relies on.

use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use serde::Deserialize;

use super::{
    config::{ComponentPath, ConfigTypeSpec, Reference},
    filter::{FilterRule, StructureFilter},
    object::{
        Associativity, CreateOperator, CreateType, CreateVariable, DeclarationScope, Directive,
        OperatorOverload, OperatorShape, StructuredObject,
    },
    structure::{
        parse_structure, ComponentKind, ComponentOverride, ComponentSpec, ExpressionsSpec,
        NamePolicy, RepeatedElement, ScopeInsertion, ScopeMode, StructureComponent, StructureRef,
    },
    GrammarError, GrammarSpec, InitializerFormat, InitializerKind, PrimitiveType,
};

/// A whole grammar document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarDef {
    /// The built-in types.
    #[serde(default)]
    pub primitive_types: Vec<PrimitiveDef>,
    /// The statement separators.
    #[serde(default)]
    pub expression_separators: Vec<String>,
    /// The productions, in enumeration order.
    #[serde(default)]
    pub structures: Vec<StructureDef>,
}

/// A built-in type and the literals that produce it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimitiveDef {
    /// The type name.
    pub name: String,
    /// A variable literal format such as `$int`.
    #[serde(default)]
    pub initialize: Option<String>,
    /// Keywords that are literals of this type, e.g. `true`.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One production.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructureDef {
    /// The production name.
    pub name: String,
    /// The whitespace-separated component string.
    pub structure: String,
    /// The spec of every variable in `structure`.
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDef>,
    /// An optional symbol declaration.
    #[serde(default)]
    pub create_variable: Option<CreateVariableDef>,
    /// An optional type declaration.
    #[serde(default)]
    pub create_type: Option<CreateTypeDef>,
    /// An optional operator declaration.
    #[serde(default)]
    pub create_operator: Option<CreateOperatorDef>,
    /// See [`StructuredObject::dependent`].
    #[serde(default)]
    pub dependent: bool,
    /// See [`StructuredObject::expression_only`].
    #[serde(default)]
    pub expression_only: bool,
}

/// One variable component.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentDef {
    /// Renames the key of the parsed value.
    #[serde(default)]
    pub field: Option<String>,
    /// The base kind and its options.
    #[serde(flatten)]
    pub kind: KindDef,
}

/// The base kind of a component, tagged by `base`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "base", rename_all = "snake_case")]
pub enum KindDef {
    /// See [`ComponentKind::Typename`].
    Typename,
    /// See [`ComponentKind::Name`].
    Name {
        /// The declaration policy.
        #[serde(default)]
        policy: NamePolicy,
    },
    /// See [`ComponentKind::Expression`].
    Expression,
    /// See [`ComponentKind::Expressions`].
    Expressions {
        /// The scope mode.
        #[serde(default)]
        scope: ScopeMode,
        /// The allowed productions.
        #[serde(default)]
        filter: Option<FilterDef>,
        /// Symbols seeded into the block.
        #[serde(default)]
        insert_scope: Vec<InsertionDef>,
    },
    /// See [`ComponentKind::RepeatedElement`].
    RepeatedElement {
        /// The component string of one element.
        structure: String,
        /// The specs of the element's variables.
        #[serde(default)]
        components: BTreeMap<String, ComponentDef>,
        /// The literal between elements.
        separator: String,
    },
    /// See [`ComponentKind::Structure`].
    Structure {
        /// The inlined production.
        structure: String,
        /// Per-use overrides keyed by the inlined production's variables.
        #[serde(default)]
        modifiers: BTreeMap<String, OverrideDef>,
    },
}

/// A filter: `"all"`, `"expressions"`, or a list of rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterDef {
    /// One of the keyword filters.
    Keyword(FilterKeyword),
    /// Productions matching any rule.
    Rules(Vec<RuleDef>),
}

/// The keyword filters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKeyword {
    /// Every production and bare expressions.
    All,
    /// Bare expressions only.
    Expressions,
}

/// One filter rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDef {
    /// See [`FilterRule::Structure`].
    Structure(String),
    /// See [`FilterRule::Contains`].
    Contains(Directive),
    /// See [`FilterRule::Excludes`].
    Excludes(Directive),
    /// See [`FilterRule::OperatorType`].
    OperatorType(OperatorShape),
    /// See [`FilterRule::And`].
    And(Vec<RuleDef>),
    /// Allows or forbids bare expressions.
    Expressions(bool),
}

/// A symbol seeded into a block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertionDef {
    /// A type reference.
    #[serde(rename = "type")]
    pub ty: String,
    /// A name reference.
    pub name: String,
}

/// Per-use overrides of an inlined production's component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideDef {
    /// See [`ComponentOverride::policy`].
    #[serde(default)]
    pub policy: Option<NamePolicy>,
    /// See [`ComponentOverride::scope`].
    #[serde(default)]
    pub scope: Option<ScopeMode>,
    /// See [`ComponentOverride::filter`].
    #[serde(default)]
    pub filter: Option<FilterDef>,
    /// See [`ComponentOverride::insert_scope`].
    #[serde(default)]
    pub insert_scope: Option<Vec<InsertionDef>>,
}

/// See [`CreateVariable`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateVariableDef {
    /// A name reference.
    pub name: String,
    /// A type string.
    #[serde(rename = "type")]
    pub ty: String,
    /// A type string to check the declared type against.
    #[serde(default)]
    pub check_type: Option<String>,
    /// Attribute name to component path.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Where the symbol is registered.
    #[serde(default)]
    pub scope: DeclarationScope,
}

/// See [`CreateType`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTypeDef {
    /// A type string.
    #[serde(rename = "type")]
    pub ty: String,
    /// Component paths of the blocks that hold the fields.
    #[serde(default)]
    pub fields_containers: Vec<String>,
}

/// See [`CreateOperator`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOperatorDef {
    /// Component paths typed by the overloads.
    pub fields: Vec<String>,
    /// The binding strength; smaller binds tighter.
    pub precedence: u32,
    /// The grouping of equal-precedence operators.
    #[serde(default)]
    pub associativity: Associativity,
    /// The signatures, tried in order.
    pub overloads: Vec<OverloadDef>,
}

/// See [`OperatorOverload`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverloadDef {
    /// Field path to type string.
    pub fields: BTreeMap<String, String>,
    /// The result type string.
    pub returns: String,
}

impl FilterDef {
    /// Converts `self` into a [`StructureFilter`].
    fn build(&self) -> StructureFilter {
        match self {
            Self::Keyword(FilterKeyword::All) => StructureFilter::all(),
            Self::Keyword(FilterKeyword::Expressions) => StructureFilter::expressions_only(),
            Self::Rules(rules) => {
                let expressions = rules.iter().any(|rule| matches!(rule, RuleDef::Expressions(true)));
                StructureFilter::rules(rules.iter().filter_map(RuleDef::build).collect(), expressions)
            }
        }
    }
}

impl RuleDef {
    /// Converts `self` into a [`FilterRule`]; expression toggles have no rule form.
    fn build(&self) -> Option<FilterRule> {
        Some(match self {
            Self::Structure(name) => FilterRule::Structure(name.clone()),
            Self::Contains(directive) => FilterRule::Contains(*directive),
            Self::Excludes(directive) => FilterRule::Excludes(*directive),
            Self::OperatorType(shape) => FilterRule::OperatorType(*shape),
            Self::And(rules) => FilterRule::And(rules.iter().filter_map(RuleDef::build).collect()),
            Self::Expressions(_) => return None,
        })
    }
}

impl InsertionDef {
    /// Converts `self` into a [`ScopeInsertion`].
    fn build(&self) -> Result<ScopeInsertion, GrammarError> {
        Ok(ScopeInsertion {
            ty: self.ty.parse()?,
            name: self.name.parse()?,
        })
    }
}

/// Converts a list of insertion defs.
fn insertions(defs: &[InsertionDef]) -> Result<Vec<ScopeInsertion>, GrammarError> {
    defs.iter().map(InsertionDef::build).collect()
}

/// Converts a map of component defs, keyed by variable name.
fn components(
    owner: &str,
    defs: &BTreeMap<String, ComponentDef>,
) -> Result<BTreeMap<String, ComponentSpec>, GrammarError> {
    defs.iter()
        .map(|(variable, def)| Ok((variable.clone(), def.build(owner, variable)?)))
        .collect()
}

impl ComponentDef {
    /// Converts `self`, the spec of `variable` in the production `owner`.
    fn build(&self, owner: &str, variable: &str) -> Result<ComponentSpec, GrammarError> {
        let field = self.field.clone().unwrap_or_else(|| variable.to_string());
        let kind = match &self.kind {
            KindDef::Typename => ComponentKind::Typename,
            KindDef::Name { policy } => ComponentKind::Name(*policy),
            KindDef::Expression => ComponentKind::Expression,
            KindDef::Expressions {
                scope,
                filter,
                insert_scope,
            } => ComponentKind::Expressions(ExpressionsSpec {
                scope: *scope,
                filter: filter.as_ref().map(FilterDef::build).unwrap_or_default(),
                insert_scope: insertions(insert_scope)?,
            }),
            KindDef::RepeatedElement {
                structure,
                components: defs,
                separator,
            } => {
                let name = format!("{owner}.{field}");
                let element = StructuredObject {
                    structure: parse_structure(structure),
                    components: components(&name, defs)?,
                    name,
                    create_variable: None,
                    create_type: None,
                    create_operator: None,
                    dependent: true,
                    expression_only: false,
                };
                validate_components(&element)?;
                ComponentKind::RepeatedElement(RepeatedElement {
                    element: Rc::new(element),
                    separator: separator.clone(),
                })
            }
            KindDef::Structure {
                structure,
                modifiers,
            } => ComponentKind::Structure(StructureRef {
                name: structure.clone(),
                overrides: modifiers
                    .iter()
                    .map(|(variable, def)| Ok((variable.clone(), def.build()?)))
                    .collect::<Result<_, GrammarError>>()?,
            }),
        };

        Ok(ComponentSpec { field, kind })
    }
}

impl OverrideDef {
    /// Converts `self` into a [`ComponentOverride`].
    fn build(&self) -> Result<ComponentOverride, GrammarError> {
        Ok(ComponentOverride {
            policy: self.policy,
            scope: self.scope,
            filter: self.filter.as_ref().map(FilterDef::build),
            insert_scope: self.insert_scope.as_deref().map(insertions).transpose()?,
        })
    }
}

impl CreateOperatorDef {
    /// Converts `self`, declared by the production `owner`.
    fn build(&self, owner: &str) -> Result<CreateOperator, GrammarError> {
        let fields = self
            .fields
            .iter()
            .map(|field| field.parse())
            .collect::<Result<Vec<ComponentPath>, _>>()?;
        let expected: BTreeSet<&String> = self.fields.iter().collect();

        let overloads = self
            .overloads
            .iter()
            .map(|overload| {
                if overload.fields.keys().collect::<BTreeSet<_>>() != expected {
                    return Err(GrammarError::OverloadFields {
                        structure: owner.to_string(),
                        expected: self.fields.clone(),
                    });
                }

                // store the declared types in the order of `fields`
                let typed = self
                    .fields
                    .iter()
                    .zip(&fields)
                    .map(|(key, path)| {
                        let declared = overload.fields.get(key).map(String::as_str).unwrap_or_default();
                        Ok((path.clone(), declared.parse()?))
                    })
                    .collect::<Result<Vec<_>, GrammarError>>()?;

                Ok(OperatorOverload {
                    fields: typed,
                    returns: overload.returns.parse()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CreateOperator {
            fields,
            precedence: self.precedence,
            associativity: self.associativity,
            overloads,
        })
    }
}

impl StructureDef {
    /// Converts `self` into a [`StructuredObject`].
    fn build(&self) -> Result<StructuredObject, GrammarError> {
        let object = StructuredObject {
            name: self.name.clone(),
            structure: parse_structure(&self.structure),
            components: components(&self.name, &self.components)?,
            create_variable: self
                .create_variable
                .as_ref()
                .map(|def| -> Result<_, GrammarError> {
                    Ok(CreateVariable {
                        name: def.name.parse::<Reference>()?,
                        ty: def.ty.parse()?,
                        check_type: def.check_type.as_deref().map(str::parse).transpose()?,
                        attributes: def
                            .attributes
                            .iter()
                            .map(|(name, path)| {
                                let path = path.strip_prefix('$').unwrap_or(path);
                                Ok((name.clone(), path.parse()?))
                            })
                            .collect::<Result<_, GrammarError>>()?,
                        scope: def.scope,
                    })
                })
                .transpose()?,
            create_type: self
                .create_type
                .as_ref()
                .map(|def| -> Result<_, GrammarError> {
                    Ok(CreateType {
                        ty: def.ty.parse()?,
                        fields_containers: def
                            .fields_containers
                            .iter()
                            .map(|path| path.strip_prefix('$').unwrap_or(path).parse())
                            .collect::<Result<_, _>>()?,
                    })
                })
                .transpose()?,
            create_operator: self
                .create_operator
                .as_ref()
                .map(|def| def.build(&self.name))
                .transpose()?,
            dependent: self.dependent,
            expression_only: self.expression_only,
        };

        validate_components(&object)?;
        Ok(object)
    }
}

/// Checks that every variable of `object` has a spec, that every block and repeated
/// element is followed by a terminator literal, and that operator fields exist.
fn validate_components(object: &StructuredObject) -> Result<(), GrammarError> {
    for (index, component) in object.structure.iter().enumerate() {
        let StructureComponent::Variable(variable) = component else {
            continue;
        };

        let spec = object
            .spec(variable)
            .ok_or_else(|| GrammarError::MissingComponent {
                structure: object.name.clone(),
                variable: variable.clone(),
            })?;

        let needs_terminator = matches!(
            spec.kind,
            ComponentKind::Expressions(_) | ComponentKind::RepeatedElement(_)
        );
        let terminated = object
            .structure
            .get(index + 1)
            .is_some_and(|next| next.literal().is_some());

        if needs_terminator && !terminated {
            return Err(GrammarError::MissingTerminator {
                structure: object.name.clone(),
                variable: variable.clone(),
            });
        }
    }

    if let Some(operator) = &object.create_operator {
        for path in &operator.fields {
            if !object.components.values().any(|spec| spec.field == path.head()) {
                return Err(GrammarError::UnknownField {
                    structure: object.name.clone(),
                    field: path.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Checks that every inlined structure named by `object` exists in `known`.
fn validate_references(
    object: &StructuredObject,
    known: &BTreeSet<&str>,
) -> Result<(), GrammarError> {
    for spec in object.components.values() {
        match &spec.kind {
            ComponentKind::Structure(target) if !known.contains(target.name.as_str()) => {
                return Err(GrammarError::UnknownStructure {
                    structure: object.name.clone(),
                    target: target.name.clone(),
                })
            }
            ComponentKind::RepeatedElement(repeated) => {
                validate_references(&repeated.element, known)?
            }
            _ => {}
        }
    }

    Ok(())
}

impl GrammarDef {
    /// Validates `self` and converts it into a [`GrammarSpec`].
    pub fn build(self) -> Result<GrammarSpec, GrammarError> {
        let mut initializers = BTreeMap::new();
        let mut primitives = Vec::new();

        for def in &self.primitive_types {
            let formats = def
                .initialize
                .iter()
                .map(|format| (format, InitializerKind::Variable))
                .chain(def.keywords.iter().map(|keyword| (keyword, InitializerKind::Literal)));

            for (format, kind) in formats {
                let previous = initializers.insert(
                    format.clone(),
                    InitializerFormat {
                        ty: def.name.clone(),
                        kind,
                    },
                );
                if previous.is_some() {
                    return Err(GrammarError::DuplicateInitializer(format.clone()));
                }
            }

            primitives.push(PrimitiveType {
                name: def.name.clone(),
                initialize: def.initialize.clone(),
                keywords: def.keywords.clone(),
            });
        }

        let mut structures = Vec::new();
        let mut seen = BTreeSet::new();
        for def in &self.structures {
            if !seen.insert(def.name.as_str()) {
                return Err(GrammarError::DuplicateStructure(def.name.clone()));
            }
            structures.push(Rc::new(def.build()?));
        }

        for object in &structures {
            validate_references(object, &seen)?;
        }

        Ok(GrammarSpec {
            primitives,
            structures,
            initializers,
            separators: self.expression_separators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(json: &str) -> Result<GrammarSpec, GrammarError> {
        serde_json::from_str::<GrammarDef>(json)?.build()
    }

    #[test]
    fn check_minimal_grammar() {
        let grammar = build(
            r#"{
                "primitive_types": [
                    {"name": "int", "initialize": "$int"},
                    {"name": "bool", "keywords": ["true", "false"]}
                ],
                "expression_separators": [";"],
                "structures": [{
                    "name": "group",
                    "structure": "( $inside )",
                    "components": {"inside": {"base": "expression"}},
                    "create_operator": {
                        "fields": ["inside"],
                        "precedence": 0,
                        "overloads": [{"fields": {"inside": "$typename<T>"}, "returns": "$typename<T>"}]
                    }
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(grammar.initializer("$int").map(|f| f.ty.as_str()), Some("int"));
        assert_eq!(grammar.initializer("true").map(|f| f.kind), Some(InitializerKind::Literal));
        let group = grammar.structure("group").unwrap();
        assert_eq!(group.shape(), Some(OperatorShape::Internal));
        assert_eq!(
            group.create_operator.as_ref().unwrap().associativity,
            Associativity::None
        );
    }

    #[test]
    fn check_validation_errors() {
        let missing = build(r#"{"structures": [{"name": "a", "structure": "x $y"}]}"#);
        assert!(matches!(missing, Err(GrammarError::MissingComponent { .. })));

        let unknown = build(
            r#"{"structures": [{"name": "a", "structure": "x $y",
                "components": {"y": {"base": "structure", "structure": "nope"}}}]}"#,
        );
        assert!(matches!(unknown, Err(GrammarError::UnknownStructure { .. })));

        let unterminated = build(
            r#"{"structures": [{"name": "a", "structure": "{ $body",
                "components": {"body": {"base": "expressions"}}}]}"#,
        );
        assert!(matches!(unterminated, Err(GrammarError::MissingTerminator { .. })));

        let overloads = build(
            r#"{"structures": [{"name": "+", "structure": "$l + $r",
                "components": {"l": {"base": "expression"}, "r": {"base": "expression"}},
                "create_operator": {"fields": ["l", "r"], "precedence": 1,
                    "overloads": [{"fields": {"l": "int"}, "returns": "int"}]}}]}"#,
        );
        assert!(matches!(overloads, Err(GrammarError::OverloadFields { .. })));

        let keywords = build(
            r#"{"primitive_types": [{"name": "a", "keywords": ["x"]}, {"name": "b", "keywords": ["x"]}]}"#,
        );
        assert!(matches!(keywords, Err(GrammarError::DuplicateInitializer(_))));

        assert!(matches!(build("{"), Err(GrammarError::Json(_))));
    }

    #[test]
    fn check_filters_and_overrides() {
        let grammar = build(
            r#"{"structures": [
                {"name": "block", "structure": "{ $body }", "dependent": true,
                 "components": {"body": {"base": "expressions", "filter": [{"structure": "decl"}]}}},
                {"name": "decl", "structure": "let $x",
                 "components": {"x": {"base": "name", "policy": "new-local"}}},
                {"name": "fn", "structure": "fn $name $body",
                 "components": {
                    "name": {"base": "name", "policy": "new-global"},
                    "body": {"base": "structure", "structure": "block",
                             "modifiers": {"body": {"scope": "local", "filter": "all"}}}}}
            ]}"#,
        )
        .unwrap();

        let block = grammar.structure("block").unwrap();
        let ComponentKind::Expressions(body) = &block.spec("body").unwrap().kind else {
            panic!("block body is not a statement list");
        };
        assert!(body.filter.is_filtering());
        assert!(!body.filter.allows_expressions());

        let function = grammar.structure("fn").unwrap();
        let ComponentKind::Structure(target) = &function.spec("body").unwrap().kind else {
            panic!("fn body is not a structure");
        };
        let patched = block.with_overrides(&target.overrides);
        let ComponentKind::Expressions(body) = &patched.spec("body").unwrap().kind else {
            panic!("patched body is not a statement list");
        };
        assert_eq!(body.scope, ScopeMode::Local);
        assert!(!body.filter.is_filtering());
    }
}
