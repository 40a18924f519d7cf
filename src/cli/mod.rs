//! [Command-line interface](Cli) (CLI) of the main binary.

use crate::manifest::ContigList;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ----------------------------------------------------------------------------
// CLI Entry Point
// ----------------------------------------------------------------------------

/// The command-line interface (CLI).
/// ---
/// ```rust
/// use clap::Parser;
/// use loftee::cli::{Cli, Command};
///
/// let args = Cli::parse_from(["loftee", "aggregate", "1,2", "eids.txt", "--verbosity", "debug"]);
/// match args.command {
///     Command::Aggregate(args) => {
///         assert_eq!(args.contigs.to_string(), "1,2");
///         assert_eq!(args.allow_list, Some("eids.txt".into()));
///     }
///     _ => unreachable!(),
/// }
/// assert_eq!(args.verbosity.to_string(), "debug");
/// ```
#[derive(Debug, Deserialize, Parser, Serialize)]
#[clap(name = "loftee", author, version)]
#[clap(about = "Annotate exome pVCFs with VEP and LOFTEE, and aggregate loss-of-function calls per gene.")]
pub struct Cli {
    #[clap(subcommand)]
    #[clap(help = "Set the command.")]
    pub command: Command,

    /// JSON config, see [`Config`](crate::config::Config).
    #[clap(short = 'c', long)]
    #[clap(global = true)]
    #[clap(help = "Read settings from a JSON config file.")]
    pub config: Option<PathBuf>,

    /// Set the output [Verbosity] level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    #[clap(help = "Set the output verbosity level.")]
    pub verbosity: Verbosity,
}

/// CLI [commands](#variants).
#[derive(Debug, Deserialize, Serialize, Subcommand)]
pub enum Command {
    #[clap(about = "Split, annotate and store every unit without an output table.")]
    Annotate(ChromArgs),

    #[clap(about = "Aggregate LOF calls per gene and export one table per chromosome.")]
    Aggregate(AggregateArgs),

    #[clap(about = "Install VEP and the LOFTEE plugin.")]
    InstallVep,
}

/// Chromosomes to process.
#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct ChromArgs {
    /// Comma-separated contigs, all 24 by default.
    #[clap(default_value_t = ContigList::default())]
    #[clap(help = "Comma-separated contigs, ex. 1,2,X")]
    pub contigs: ContigList,
}

#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct AggregateArgs {
    #[clap(default_value_t = ContigList::default())]
    #[clap(help = "Comma-separated contigs, ex. 1,2,X")]
    pub contigs: ContigList,

    /// Allow-list file, relative to the project directory.
    #[clap(help = "File of individual ids to keep, one per line.")]
    pub allow_list: Option<PathBuf>,
}

// -----------------------------------------------------------------------------
// Verbosity
// -----------------------------------------------------------------------------

/// The output verbosity level, written lowercase to `RUST_LOG`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, strum::Display, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}
