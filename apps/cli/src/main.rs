//! Slidecast CLI: narrated audio for slide decks.
//!
//! Turns a presentation's extracted slide text into a validated narration
//! script and a single narrated audio track.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
