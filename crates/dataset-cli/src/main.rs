//! task-dataset CLI - build frame/audio/caption datasets from robot task videos

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::assemble::AssembleCommand;
use commands::build::BuildCommand;
use commands::caption::CaptionCommand;
use commands::decompose::DecomposeCommand;
use commands::extract_audio::ExtractAudioCommand;
use commands::rename::RenameCommand;

#[derive(Parser)]
#[command(
    name = "task-dataset",
    version,
    about = "Build frame/audio/caption datasets from robot task videos",
    long_about = "Slices every video of a directory into fixed-length frame/audio pairs,\n\
                  captions each frame with a BLIP model and writes one JSON dataset.",
    after_help = "EXAMPLES:\n  \
                  # Full build with defaults (videos/ -> frames/, audio/, dataset.json)\n  \
                  task-dataset build\n\n  \
                  # Two-second slices, 4 caption workers, YAML config\n  \
                  task-dataset build --config dataset.yaml --slice-duration 2 --workers 4\n\n  \
                  # Decompose only, 3 videos at a time\n  \
                  task-dataset decompose --videos-dir raw --jobs 3\n\n  \
                  # Re-caption an existing decomposition\n  \
                  task-dataset assemble --frames-dir frames --audio-dir audio\n\n  \
                  # Rename frames after their captions\n  \
                  task-dataset rename dataset.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose, pair, caption and write the dataset
    Build(BuildCommand),

    /// Only slice videos into frames and audio segments
    Decompose(DecomposeCommand),

    /// Pair, caption and write the dataset from an existing decomposition
    Assemble(AssembleCommand),

    /// Caption every frame under a directory and print the captions
    Caption(CaptionCommand),

    /// Extract the whole audio track of every video
    ExtractAudio(ExtractAudioCommand),

    /// Rename captioned frames after their captions and update the dataset
    Rename(RenameCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Build(cmd) => cmd.execute(),
        Commands::Decompose(cmd) => cmd.execute(),
        Commands::Assemble(cmd) => cmd.execute(),
        Commands::Caption(cmd) => cmd.execute(),
        Commands::ExtractAudio(cmd) => cmd.execute(),
        Commands::Rename(cmd) => cmd.execute(),
    }
}
