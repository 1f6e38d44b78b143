//! Abstract syntax trees produced by the parser.

use std::fmt::Display;

use crate::context::{ParsingContext, ScopeId};

use self::instance::Node;

pub mod instance;

/// The result of parsing a source unit: the top-level statements and the symbol
/// table they built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    /// The top-level statements, in source order.
    nodes: Vec<Node>,
    /// The final symbol table; top-level declarations live in its root scope.
    context: ParsingContext,
}

impl Ast {
    /// Constructs a new [`Ast`] from its parts.
    pub fn new(nodes: Vec<Node>, context: ParsingContext) -> Self {
        Self { nodes, context }
    }

    /// Returns the top-level statements.
    #[inline(always)]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the final symbol table.
    #[inline(always)]
    pub fn context(&self) -> &ParsingContext {
        &self.context
    }

    /// Returns the symbols declared at the top level, ordered by name.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &crate::grammar::types::TypeSpec)> {
        self.context.symbols(ScopeId::ROOT)
    }

    /// Returns the number of nodes across every statement.
    pub fn count_nodes(&self) -> usize {
        self.nodes.iter().map(Node::count_nodes).sum()
    }

    /// Consumes `self` and returns its parts.
    pub fn into_parts(self) -> (Vec<Node>, ParsingContext) {
        (self.nodes, self.context)
    }
}

impl Display for Ast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grammar::fixtures, parser::parse_source};

    #[test]
    fn check_ast_accessors() {
        let grammar = fixtures::standard();
        let ast = parse_source(&grammar, "int x = 1 + 2; x = x * 3;").unwrap();
        dbg!(&ast);

        // each statement is one node plus the three nodes of its expression
        assert_eq!(ast.count_nodes(), 8);
        assert_eq!(ast.to_string(), "(var_decl int x (+ 1 2))\n(assignment x (* x 3))\n");
        assert_eq!(ast.globals().map(|(name, _)| name).collect::<Vec<_>>(), vec!["x"]);

        let (nodes, context) = ast.into_parts();
        assert_eq!(nodes.len(), 2);
        assert!(context.lookup(ScopeId::ROOT, "x").is_some());
    }
}
