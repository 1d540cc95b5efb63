pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "panforge",
    version,
    about = "Distributed pangenome construction for microbial genome collections",
    long_about = "Panforge pools the annotated genes of every genome in a species, clusters the \
                  pool at a ladder of percent-identity thresholds with an external clustering \
                  tool, and consolidates the per-threshold assignments into a single \
                  gene-to-centroid table per species."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build pangenomes for the selected species
    Build(commands::build::BuildArgs),
}
