//! Trellis CLI: inspect and maintain the persisted type cache.
//!
//! Provides `trellis check` to validate the cache document against the
//! configured assembly inventory, `trellis write` to regenerate it,
//! `trellis load` to run the load-or-populate sequence the framework runs at
//! startup, and `trellis show` to print the document without validating it.

#![warn(missing_docs)]

mod check;
mod load;
mod pipeline;
mod show;
mod write;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Trellis: type cache tooling for the Trellis web framework.
#[derive(Parser, Debug)]
#[command(name = "trellis", version, about = "Trellis type cache tooling")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `trellis.toml` file or the directory containing it.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the persisted type cache against the current inventory.
    Check(CheckArgs),
    /// Enumerate types and overwrite the persisted type cache.
    Write,
    /// Load the type cache, enumerating and saving it on a miss.
    Load,
    /// Print the persisted type cache without validating it.
    Show,
}

/// Arguments for the `trellis check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output format for the report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file or directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Check(ref args) => check::run(args, &global),
        Command::Write => write::run(&global),
        Command::Load => load::run(&global),
        Command::Show => show::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber.
///
/// `--verbose` and `--quiet` take precedence over `RUST_LOG`.
fn init_logging(global: &GlobalArgs) {
    let filter = if global.verbose {
        EnvFilter::new("debug")
    } else if global.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
