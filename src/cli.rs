//! The command-line interface for `grammarc`.
//!
//! Usage (as with any other [`argh`] interface) involves first invoking [`argh::from_env()`], and
//! then processing the resulting data (in this case an instance of [`Cli`]).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context};
use argh::FromArgs;
use grammarc::{
    context::{ParsingContext, ScopeId},
    grammar::{types::TypeSpec, GrammarSpec},
    lexer::{Lexer, Tokenize},
    parser::Parser,
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, multispace0},
    combinator::{cut, opt, recognize},
    error::{context, VerboseError},
    multi::{many0_count, separated_list0},
    sequence::{delimited, pair, separated_pair},
    Finish, IResult, Parser as _,
};
use tracing_subscriber::EnvFilter;

/// Parses source files of languages described by a JSON grammar.
#[derive(Debug, Clone, FromArgs)]
pub struct Cli {
    /// log the decisions of the parser (overridden by RUST_LOG)
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    cmd: CliSubCommand,
}

impl Cli {
    /// Consumes `self` and processes the given subcommand.
    pub fn handle(self) -> anyhow::Result<()> {
        let fallback = match self.verbose {
            true => "debug",
            false => "warn",
        };
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
            .with_writer(std::io::stderr)
            .init();

        match self.cmd {
            CliSubCommand::Parse(args) => args.run(),
            CliSubCommand::Tokens(args) => args.run(),
        }
    }
}

/// The set of the distinct subcommands available to be passed to the [`Cli`].
#[derive(Debug, Clone, FromArgs)]
#[argh(subcommand)]
enum CliSubCommand {
    /// See [`Parse`].
    Parse(Parse),
    /// See [`Tokens`].
    Tokens(Tokens),
}

/// Parses a source file, printing its statements and then its global symbols.
#[derive(Debug, Clone, FromArgs)]
#[argh(subcommand, name = "parse")]
struct Parse {
    /// pre-declare symbols via a comma-separated list of name-type pairs
    /// (e.g. {{ n: int, pi: float }})
    #[argh(option, short = 'd')]
    define: Option<Definitions>,

    /// a path to a JSON grammar
    #[argh(positional)]
    grammar: PathBuf,

    /// a path to a source file
    #[argh(positional)]
    source: PathBuf,
}

impl Parse {
    /// Consumes `self` and parses the source file.
    fn run(self) -> anyhow::Result<()> {
        let grammar = load_grammar(&self.grammar)?;
        let source = std::fs::read_to_string(&self.source)
            .with_context(|| format!("could not read {}", self.source.display()))?;

        let lexer = Lexer::for_grammar(&grammar);
        let tokens = lexer.tokenize(&source)?;

        let mut context = ParsingContext::new();
        for (name, ty) in self.define.map(|defs| defs.symbols).unwrap_or_default() {
            context.declare(ScopeId::ROOT, name, TypeSpec::named(ty));
        }

        let ast = match Parser::new(&grammar, &lexer, tokens).with_context(context).parse() {
            Ok(ast) => ast,
            Err(err) => {
                eprint!("{}", err.traceback());
                return Err(anyhow!("could not parse {}", self.source.display()));
            }
        };

        print!("{ast}");
        println!("\nglobals:");
        print!("{}", ast.context());
        Ok(())
    }
}

/// Prints the tokens of a source file, one per line.
#[derive(Debug, Clone, FromArgs)]
#[argh(subcommand, name = "tokens")]
struct Tokens {
    /// a path to a JSON grammar
    #[argh(positional)]
    grammar: PathBuf,

    /// a path to a source file
    #[argh(positional)]
    source: PathBuf,
}

impl Tokens {
    /// Consumes `self` and tokenizes the source file.
    fn run(self) -> anyhow::Result<()> {
        let grammar = load_grammar(&self.grammar)?;
        let source = std::fs::read_to_string(&self.source)
            .with_context(|| format!("could not read {}", self.source.display()))?;

        for token in Lexer::for_grammar(&grammar).tokenize(&source)? {
            println!("{}:{}\t{}\t{}", token.line, token.column, token.kind, token.text);
        }
        Ok(())
    }
}

/// Reads and validates the grammar at `path`.
fn load_grammar(path: &Path) -> anyhow::Result<GrammarSpec> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("could not read grammar {}", path.display()))?;
    GrammarSpec::from_json(&json).with_context(|| format!("invalid grammar {}", path.display()))
}

/// Parses an identifier.
fn identifier(input: &str) -> IResult<&str, &str, VerboseError<&str>> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

/// A set of name-type pairs declared in the root scope before parsing.
#[derive(Debug, Clone)]
struct Definitions {
    /// The declared symbols, mapping names to type names.
    symbols: BTreeMap<String, String>,
}

impl FromStr for Definitions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        delimited(
            pair(tag("{"), opt(multispace0)),
            separated_list0(
                delimited(multispace0, tag(","), multispace0),
                context(
                    "expected name-type pair",
                    separated_pair(
                        context("expected name", identifier),
                        delimited(
                            multispace0,
                            context("expected colon", tag(":")),
                            multispace0,
                        ),
                        cut(context("expected type name", identifier)),
                    ),
                ),
            ),
            pair(opt(multispace0), tag("}")),
        )
        .parse(s)
        .finish()
        .map(|(_, pairs)| Definitions {
            symbols: pairs
                .into_iter()
                .map(|(name, ty): (&str, &str)| (name.to_string(), ty.to_string()))
                .collect(),
        })
        .map_err(|err: VerboseError<&str>| {
            let trace = nom::error::convert_error(s, err);
            format!("\nerror trace:\n{trace}")
        })
    }
}
