//! Dotted component paths resolved against parsed items.
//!
//! A path like `params.type` starts at a component of the instance being parsed (or
//! of an enclosing instance) and descends through inlined structures. Descending into
//! a repeated element maps the rest of the path over every element, so the result is
//! then a list.

use std::collections::BTreeMap;

use crate::{ast::instance::Item, grammar::config::ComponentPath};

/// The components of one instance.
pub type Components = BTreeMap<String, Item>;

/// The items a path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found<'a> {
    /// The path did not pass through a repeated element.
    One(&'a Item),
    /// The path passed through a repeated element; one item per element.
    Many(Vec<&'a Item>),
}

impl<'a> Found<'a> {
    /// Returns every found item, in order.
    pub fn items(&self) -> Vec<&'a Item> {
        match self {
            Self::One(item) => vec![*item],
            Self::Many(items) => items.clone(),
        }
    }
}

/// Resolves `path` against `chain`, the components of the innermost instance first.
pub fn lookup<'a>(chain: &[&'a Components], path: &ComponentPath) -> Option<Found<'a>> {
    let head = chain
        .iter()
        .find_map(|components| components.get(path.head()))?;

    path.tail()
        .iter()
        .try_fold(Found::One(head), |found, segment| descend(found, segment))
}

/// Steps from `found` into the field `segment`.
fn descend<'a>(found: Found<'a>, segment: &str) -> Option<Found<'a>> {
    match found {
        Found::One(Item::Structure(instance)) => instance.get(segment).map(Found::One),
        Found::One(Item::RepeatedElement(elements)) => elements
            .iter()
            .map(|element| element.get(segment))
            .collect::<Option<Vec<_>>>()
            .map(Found::Many),
        Found::One(_) => None,
        Found::Many(items) => {
            let mut out = Vec::new();
            for item in items {
                match descend(Found::One(item), segment)? {
                    Found::One(inner) => out.push(inner),
                    Found::Many(inner) => out.extend(inner),
                }
            }
            Some(Found::Many(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        ast::instance::StructuredObjectInstance,
        grammar::{fixtures, structure::ComponentKind, types::TypeSpec},
    };

    fn params(types: &[(&str, &str)]) -> Item {
        let grammar = fixtures::standard();
        let function = grammar.structure("function_def").unwrap();
        let ComponentKind::RepeatedElement(repeated) = &function.spec("params").unwrap().kind else {
            panic!("params is not a repeated element");
        };

        Item::RepeatedElement(
            types
                .iter()
                .map(|(ty, name)| {
                    let mut element = StructuredObjectInstance::new(Rc::clone(&repeated.element), None);
                    element
                        .components
                        .insert("type".to_string(), Item::Typename(TypeSpec::named(*ty)));
                    element
                        .components
                        .insert("name".to_string(), Item::Name(name.to_string()));
                    element
                })
                .collect(),
        )
    }

    #[test]
    fn check_lookup_through_repeated_elements() {
        let mut components = Components::new();
        components.insert("params".to_string(), params(&[("int", "a"), ("float", "b")]));
        components.insert("name".to_string(), Item::Name("add".to_string()));

        let path: ComponentPath = "params.type".parse().unwrap();
        let found = lookup(&[&components], &path).unwrap();
        assert_eq!(
            found.items(),
            vec![
                &Item::Typename(TypeSpec::named("int")),
                &Item::Typename(TypeSpec::named("float"))
            ]
        );

        let name: ComponentPath = "name".parse().unwrap();
        assert_eq!(
            lookup(&[&components], &name),
            Some(Found::One(&Item::Name("add".to_string())))
        );

        let missing: ComponentPath = "params.nope".parse().unwrap();
        assert_eq!(lookup(&[&components], &missing), None);
    }

    #[test]
    fn check_lookup_falls_back_to_outer_components() {
        let inner = Components::new();
        let mut outer = Components::new();
        outer.insert("params".to_string(), params(&[]));

        let path: ComponentPath = "params.name".parse().unwrap();
        assert_eq!(lookup(&[&inner, &outer], &path), Some(Found::Many(Vec::new())));
    }
}
