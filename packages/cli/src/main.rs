mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{
    describe, format, new, search, validate, DescribeArgs, FormatArgs, NewArgs, SearchArgs,
    ValidateArgs,
};
use tracing_subscriber::EnvFilter;

/// Structdoc CLI - schema-driven structured XML documents
#[derive(Parser, Debug)]
#[command(name = "structdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log loading and saving details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a new document filled with defaults
    New(NewArgs),

    /// Load documents and check they save cleanly
    Validate(ValidateArgs),

    /// Normalize a document by loading and saving it
    Format(FormatArgs),

    /// Print the item tree with descriptions
    Describe(DescribeArgs),

    /// Print the items a search leaves visible
    Search(SearchArgs),
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| {
            let cwd = cwd.display().to_string();
            match cli.command {
                Command::New(args) => new(args, &cwd),
                Command::Validate(args) => validate(args, &cwd),
                Command::Format(args) => format(args, &cwd),
                Command::Describe(args) => describe(args, &cwd),
                Command::Search(args) => search(args, &cwd),
            }
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
