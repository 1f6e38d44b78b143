//! A parser for languages described by a declarative grammar.
//!
//! A [`GrammarSpec`](grammar::GrammarSpec) is loaded from JSON and lists the primitive
//! types, statement separators and productions of a language. Source text is split
//! into tokens by the [`Lexer`](lexer::Lexer) and then matched against the productions
//! by the [`Parser`](parser::Parser), which
//!
//! - tries every production that can start at the cursor and keeps the one filling
//!   the most components,
//! - parses expressions with a precedence-climbing engine that handles arbitrary
//!   mixfix operators,
//! - resolves operator overloads against the types of their operands, and
//! - records declarations in a scoped, transactional symbol table.
//!
//! ```
//! # use grammarc::{grammar::GrammarSpec, parser::parse_source};
//! # let json = std::fs::read_to_string("grammars/standard.json").unwrap();
//! # let grammar: GrammarSpec = json.parse().unwrap();
//! let ast = parse_source(&grammar, "int x = 5 + 4 * 2;").unwrap();
//! assert_eq!(ast.to_string(), "(var_decl int x (+ 5 (* 4 2)))\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

extern crate static_assertions as sa;

pub mod ast;
pub mod context;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod typeck;
