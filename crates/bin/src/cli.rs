//! CLI argument definitions for the livetree binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    /// Aligned tables and pretty-printed JSON
    Human,
    /// One compact JSON value per command
    Json,
}

/// livetree document tool
#[derive(Parser, Debug)]
#[command(name = "livetree")]
#[command(about = "livetree: inspect, diff and replay convergent tree documents")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "human", env = "LIVETREE_FORMAT")]
    pub format: Format,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a snapshot, apply relayed ops and print the resulting document
    Replay(ReplayArgs),
    /// Print the ops turning one snapshot into another
    Diff(DiffArgs),
    /// Compute list positions
    #[command(subcommand)]
    Position(PositionCommand),
}

/// Arguments for the replay command
#[derive(clap::Args, Debug)]
pub struct ReplayArgs {
    /// Snapshot file: a JSON array of `[id, node]` pairs
    pub snapshot: PathBuf,

    /// File holding a JSON array of ops, applied in order as relayed ops
    pub ops: Option<PathBuf>,

    /// Connection id of the replaying client
    #[arg(short, long, default_value_t = 1, env = "LIVETREE_CONNECTION_ID")]
    pub connection_id: u32,
}

/// Arguments for the diff command
#[derive(clap::Args, Debug)]
pub struct DiffArgs {
    /// Snapshot describing the current tree
    pub from: PathBuf,

    /// Snapshot describing the wanted tree
    pub to: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum PositionCommand {
    /// Smallest convenient position after the given one
    After { position: String },
    /// Position before the given one
    Before { position: String },
    /// Position strictly between two positions, in either order
    Between { first: String, second: String },
}
