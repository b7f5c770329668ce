use crate::config::CONFIG_ENV;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "formula-deployer")]
#[command(
    author,
    version,
    about = "Deploy and configure smart contracts from ordered JSON formulas"
)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Settings file; falls back to config/default.toml, then built-in defaults
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute every step of a formula against a network
    Deploy {
        /// Formula file name (looked up in the formulas directory) or path
        formula: String,

        /// Network id from the networks file
        network: String,

        /// Write a JSON report of the run to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Write the standard-JSON input used to verify a contract's source
    VerificationInput {
        /// Solidity source file
        contract: PathBuf,

        /// Output path (defaults to the configured verification output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
