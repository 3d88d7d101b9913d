//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "ecreflash")]
#[command(author, version, about = "Safely reflash a running embedded controller", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reflash the EC from a firmware image file
    ///
    /// Erases, writes, and verifies the RO and RW flash regions while the EC
    /// keeps running, preserving the board's reserved ranges. Not cancellable
    /// once erasing starts.
    Reflash {
        /// Firmware image file (must be exactly 512 KiB)
        image: PathBuf,

        /// Programmer to use
        #[arg(short, long, default_value = "lpc", help = programmer_help())]
        programmer: String,
    },

    /// Show EC identity and power readiness telemetry
    Status {
        /// Programmer to use
        #[arg(short, long, default_value = "lpc", help = programmer_help())]
        programmer: String,
    },

    /// List supported programmers
    ListProgrammers,
}
