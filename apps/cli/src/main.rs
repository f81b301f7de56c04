//! venuebot CLI: links graph venues to Foursquare and keeps them enriched.
//!
//! Runs the enrichment service (`serve`) and one-shot lookups, searches and
//! configuration commands against the local graph database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
