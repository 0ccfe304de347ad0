//! Kelp CLI
//!
//! Command-line interface for the kelp element tree engine

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "kelp")]
#[command(about = "Kelp: resolve FSH paths against FHIR StructureDefinitions")]
#[command(version = kelp_core::VERSION)]
#[command(
    long_about = "Kelp builds the element tree of a FHIR StructureDefinition, resolves FHIR Shorthand\n\
paths against it (unfolding data types and creating slices as needed) and prints the result.\n\
\n\
Examples:\n  \
kelp resolve Observation valueQuantity.system --defs ./fhir    # Resolve a path\n  \
kelp resolve resprate 'category[VSCat]' --json                 # Print the element\n  \
kelp tree Observation code.text --out ./out                    # Write the changed definition"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        help = "Path to configuration file (kelp.json/kelp.yaml)"
    )]
    config: Option<PathBuf>,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Number of threads to use for loading definitions
    #[arg(
        short = 'j',
        long,
        global = true,
        help = "Number of threads (default: number of CPU cores)"
    )]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve paths against a definition and print the elements they address
    Resolve {
        /// Definition name, id or url, or a path to a StructureDefinition JSON file
        definition: String,

        /// FSH paths to resolve
        #[arg(required = true)]
        paths: Vec<String>,

        /// Directories of definition JSON (overrides the config file)
        #[arg(short, long = "defs", value_name = "DIR")]
        defs: Vec<PathBuf>,

        /// Print each resolved element as JSON instead of its id
        #[arg(long)]
        json: bool,
    },

    /// Resolve paths, then print or write the resulting StructureDefinition
    Tree {
        /// Definition name, id or url, or a path to a StructureDefinition JSON file
        definition: String,

        /// FSH paths to resolve before printing
        paths: Vec<String>,

        /// Directories of definition JSON (overrides the config file)
        #[arg(short, long = "defs", value_name = "DIR")]
        defs: Vec<PathBuf>,

        /// Output directory for StructureDefinition-<id>.json
        #[arg(short, long, help = "Output directory (default: print to stdout)")]
        out: Option<PathBuf>,

        /// Only print the differential
        #[arg(long)]
        differential_only: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if !cli.no_color && std::env::var("NO_COLOR").is_err() {
        colored::control::set_override(true);
    } else {
        colored::control::set_override(false);
    }

    let log_level = match cli.verbose {
        0 => "kelp=error",
        1 => "kelp=warn",
        2 => "kelp=info",
        3 => "kelp=debug",
        _ => "kelp=trace",
    };
    kelp_core::init_tracing_with(log_level);

    if let Some(threads) = cli.threads
        && let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
    {
        error!("Failed to set thread pool size: {}", e);
        std::process::exit(1);
    }

    match run_command(cli) {
        Ok(summary) if summary.has_errors() => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            error!("kelp failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_command(cli: Cli) -> anyhow::Result<output::RunSummary> {
    let config = kelp_core::ConfigLoader::load(cli.config.as_deref(), None)?;

    match cli.command {
        Commands::Resolve {
            definition,
            paths,
            defs,
            json,
        } => commands::resolve_command(&config, &definition, &paths, defs, json),

        Commands::Tree {
            definition,
            paths,
            defs,
            out,
            differential_only,
        } => commands::tree_command(&config, &definition, &paths, defs, out, differential_only),
    }
}
