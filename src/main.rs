// ABOUTME: CLI entry point for postgres-constraint-cloner
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use postgres_constraint_cloner::commands;
use postgres_constraint_cloner::engine::CloneOptions;

#[derive(Parser)]
#[command(name = "postgres-constraint-cloner")]
#[command(about = "Clone PostgreSQL data between databases, resolving FK insert order by retry", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy all rows from source to target (target schema must already exist)
    Clone {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// Rows per multi-row INSERT batch
        #[arg(long, default_value_t = 2000)]
        batch_size: usize,
        /// Skip the post-copy row count verification
        #[arg(long)]
        no_verify: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare row counts between source and target without copying
    Verify {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clone {
            source,
            target,
            batch_size,
            no_verify,
            yes,
            json,
        } => {
            let options = CloneOptions {
                batch_size,
                verify: !no_verify,
            };
            commands::clone(&source, &target, options, yes, json).await
        }
        Commands::Verify { source, target } => commands::verify(&source, &target).await,
    }
}
