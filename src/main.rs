//! The `grammarc` binary.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

mod cli;

fn main() -> anyhow::Result<()> {
    better_panic::install();
    argh::from_env::<cli::Cli>().handle()
}
