use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally", about = "Tally: time-weighted ownership and royalty distribution", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a scenario file and report every distribution's claims
    Simulate(SimulateArgs),
    /// Replay a scenario file and print its audit trail
    Events(EventsArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct SimulateArgs {
    pub scenario: PathBuf,
    /// Only print claims of this holder label
    #[arg(long)]
    pub holder: Option<String>,
}

#[derive(Args)]
pub struct EventsArgs {
    pub scenario: PathBuf,
    /// Only print events of this kind, e.g. `Claimed`
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Load and validate this file instead of printing the defaults
    #[arg(long)]
    pub path: Option<PathBuf>,
}
