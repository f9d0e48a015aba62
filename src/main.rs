//! dashopt - declarative option parsing from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dashopt::{create_parser, CompletionConfig, HelpConfig, Indent, NameSort, ParseConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Parse options, render help, and generate Bash completion from a JSON
/// option configuration.
#[derive(Parser, Debug)]
#[command(name = "dashopt", version, about, disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse arguments and print the results as JSON
    Parse {
        /// JSON option configuration
        #[arg(long)]
        config: String,

        /// Arguments to parse
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Print help text for the configured options
    Help {
        /// JSON option configuration
        #[arg(long)]
        config: String,

        /// Number of spaces before each option line
        #[arg(long)]
        indent: Option<usize>,

        /// Column at which help text is wrapped
        #[arg(long)]
        max_col: Option<usize>,

        /// Fixed column for help text
        #[arg(long)]
        help_col: Option<usize>,

        /// Order of names within an option line
        #[arg(long, value_parser = parse_name_sort)]
        name_sort: Option<NameSort>,

        /// Do not wrap help text
        #[arg(long)]
        no_wrap: bool,

        /// Mention environment variables in option help
        #[arg(long)]
        include_env: bool,

        /// Mention default values in option help
        #[arg(long)]
        include_default: bool,
    },

    /// Print a Bash completion script for the configured options
    Completion {
        /// JSON option configuration
        #[arg(long)]
        config: String,

        /// Name of the tool to complete
        #[arg(long)]
        name: String,

        /// Also complete hidden options
        #[arg(long)]
        include_hidden: bool,

        /// Completion type for positional arguments (repeatable, the last one repeats)
        #[arg(long = "argtype")]
        argtypes: Vec<String>,

        /// Bash appended to the script
        #[arg(long)]
        spec_extra: Option<String>,

        /// Print only the `local cmd_*` declarations
        #[arg(long)]
        spec_only: bool,

        /// Suffix for the declared variable names
        #[arg(long, default_value = "")]
        context: String,
    },
}

fn parse_name_sort(value: &str) -> Result<NameSort, String> {
    value.parse()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(json: &str) -> Result<ParseConfig> {
    ParseConfig::from_json(json).context("failed to parse config JSON")
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { config, args } => {
            let cfg = load_config(&config)?;
            let parser = create_parser(&cfg).context("invalid config")?;
            let results = parser.parse(&args).context("failed to parse arguments")?;
            let json =
                serde_json::to_string_pretty(&results).context("failed to serialize results")?;
            println!("{}", json);
        }
        Commands::Help {
            config,
            indent,
            max_col,
            help_col,
            name_sort,
            no_wrap,
            include_env,
            include_default,
        } => {
            let cfg = load_config(&config)?;
            let parser = create_parser(&cfg).context("invalid config")?;

            let mut help = HelpConfig {
                help_col,
                help_wrap: !no_wrap,
                include_env,
                include_default,
                ..HelpConfig::default()
            };
            if let Some(indent) = indent {
                help.indent = Indent::Spaces(indent);
            }
            if let Some(max_col) = max_col {
                help.max_col = max_col;
            }
            if let Some(name_sort) = name_sort {
                help.name_sort = name_sort;
            }

            print!("{}", parser.help(&help));
        }
        Commands::Completion {
            config,
            name,
            include_hidden,
            argtypes,
            spec_extra,
            spec_only,
            context,
        } => {
            let cfg = load_config(&config)?;
            let parser = create_parser(&cfg).context("invalid config")?;

            let completion = CompletionConfig {
                name,
                spec_extra,
                argtypes,
                include_hidden,
                context,
            };
            if spec_only {
                print!("{}", parser.completion_spec(&completion));
            } else {
                let script = parser
                    .bash_completion(&completion)
                    .context("failed to generate completion")?;
                print!("{}", script);
            }
        }
    }

    Ok(())
}
