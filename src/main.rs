use anyhow::Result;
use clap::Parser;

use ost_ingest::cli::{Cli, Commands};
use ost_ingest::commands::{run_ingest, run_journals, run_relink, run_stats};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Journals(args) => {
            run_journals(args)?;
        }
        Commands::Ingest(args) => {
            run_ingest(args)?;
        }
        Commands::Relink(args) => {
            run_relink(args)?;
        }
        Commands::Stats(args) => {
            run_stats(args)?;
        }
    }

    Ok(())
}
