use clap::Parser;
use colored::*;
use panforge::cli::{Cli, Commands};
use panforge::PanforgeError;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging with PANFORGE_LOG environment variable support
    let log_level = std::env::var("PANFORGE_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<PanforgeError>() {
            Some(PanforgeError::Selection(_)) | Some(PanforgeError::Config(_)) => 2,
            Some(PanforgeError::Io(_)) => 3,
            Some(PanforgeError::Parse(_)) | Some(PanforgeError::Catalog(_)) => 4,
            Some(PanforgeError::Store(_)) => 5,
            Some(PanforgeError::Tool(_)) => 6,
            Some(PanforgeError::Integrity(_)) => 7,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let num_threads = if cli.threads == 0 {
        num_cpus::get()
    } else {
        cli.threads
    };

    // Initialize the global rayon pool used for genome normalization.
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .expect("Failed to initialize thread pool");

    if cli.verbose > 0 {
        eprintln!("Using {} threads", num_threads);
    }

    match cli.command {
        Commands::Build(args) => panforge::cli::commands::build::run(args, num_threads),
    }
}
