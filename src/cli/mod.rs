use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "bridge-upgrade")]
#[command(version)]
#[command(about = "Resumable, step-gated bridge upgrade orchestration")]
#[command(long_about = "Drives the staged bridge upgrade through the system dictator. Each step is gated on \
                       the dictator's step pointer, so re-running picks up where the last run stopped. \
                       Callers other than the configured controller get unsigned transactions to execute \
                       out-of-band.")]
pub struct Cli {
    /// Configuration file (defaults to ./bridge-upgrade.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every upgrade sequence carrying the tag
    Run {
        /// Tag selecting the sequence, e.g. phase2
        #[arg(long, default_value = "phase2")]
        tag: String,
        /// Address of the calling account
        #[arg(long, help = "Caller address; the configured controller signs directly, anyone else gets unsigned transactions")]
        account: String,
        /// Rehearse against a JSON snapshot instead of the chain
        #[arg(long, help = "Rehearse against a JSON snapshot; the updated snapshot is written back")]
        state_file: Option<PathBuf>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the step pointer and where each step stands, without changing anything
    Status {
        #[arg(long, help = "Read from a JSON snapshot instead of the chain")]
        state_file: Option<PathBuf>,
    },
    /// List the steps of the upgrade plan
    Steps,
    /// Write a default configuration file
    InitConfig {
        #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
