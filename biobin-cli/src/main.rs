//! biobin-rs: Rare-variant binning and association testing.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "biobin",
    version,
    about = "BioBin-RS: rare-variant binning and burden testing",
    long_about = "Collapses rare loci into pathway, gene and intergenic bins and tests\n\
                   each bin against every phenotype with burden regression, SKAT or a\n\
                   rank-sum test."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bin and test a synthetic cohort end to end
    Simulate(commands::simulate::SimulateArgs),

    /// List the available association tests
    ListTests(commands::list_tests::ListTestsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Phenotype workers get their own pool; this one covers everything else.
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("BioBin-RS v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args, cli.threads),
        Commands::ListTests(args) => commands::list_tests::run(args),
    }
}
