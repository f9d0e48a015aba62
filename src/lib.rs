//! dashopt - declarative command-line option parsing.
//!
//! Options are described as data (a list of option specs and group
//! headings, usually loaded from JSON), compiled into an option table, and
//! then used to parse argv, render help text, and generate Bash completion.
//!
//! ```no_run
//! use dashopt::{OptionSpec, ParseConfig};
//!
//! let config = ParseConfig::new([
//!     OptionSpec::new(["verbose", "v"], "arrayOfBool").help("More output."),
//!     OptionSpec::new(["file", "f"], "string").help_arg("FILE").env("TOOL_FILE"),
//! ]);
//! let results = dashopt::parse(&config, &["-vv", "--file=x.txt", "rest"]).unwrap();
//! assert_eq!(results.get_str("file"), Some("x.txt"));
//! ```

pub mod completion;
pub mod config;
pub mod help;
pub mod parser;
pub mod table;
pub mod types;

pub use config::{
    group, CompletionConfig, ConfigError, Entry, HelpConfig, Indent, NameSort, OptionSpec,
    ParseConfig,
};
pub use parser::{ParseError, ParsedArg, Parser, Provenance, Results};
pub use table::{CompiledOption, OptionTable};
pub use types::{OptionType, OptionValue, ParseArgFn, TypeRegistry};

use thiserror::Error;

/// Either a configuration or a parse failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Build a parser from a configuration using the built-in types.
pub fn create_parser(config: &ParseConfig) -> Result<Parser, ConfigError> {
    Parser::new(config)
}

/// Compile `config` and parse `argv` in one step.
///
/// `argv` is sliced according to `config.slice` (default 0).
pub fn parse<S: AsRef<str>>(config: &ParseConfig, argv: &[S]) -> Result<Results, Error> {
    let parser = create_parser(config)?;
    Ok(parser.parse(argv)?)
}
