//! CLI argument definitions for the Tessera binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tessera live document fragments
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Tessera: live-collaborative document fragments")]
#[command(version)]
pub struct Cli {
    /// JSON runtime configuration file
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the insert/delete operations between two texts
    Diff(DiffArgs),
    /// Load a document, run its fragments and print the result
    Render(RenderArgs),
}

/// Arguments for the diff command
#[derive(clap::Args, Debug)]
pub struct DiffArgs {
    /// Old text file (or text, with --literal)
    pub old: String,

    /// New text file (or text, with --literal)
    pub new: String,

    /// Treat OLD and NEW as the texts themselves rather than file paths
    #[arg(long)]
    pub literal: bool,
}

/// Arguments for the render command
#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Document as a JSON-serialized VNode
    pub document: PathBuf,

    /// JSON array of scripted edits applied in order
    #[arg(long)]
    pub edits: Option<PathBuf>,
}
