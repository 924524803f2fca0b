//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "interscribe",
    version,
    about = "Low-latency two-source speech transcription for live interviews"
)]
pub struct Cli {
    /// Path to configuration file (default: ~/.config/interscribe/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Listen address override, e.g. 0.0.0.0:8970
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the transcription server (the default when no command is given)
    Serve,
    /// List audio capture devices usable for server-side system audio
    Devices,
}
