use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI для контейнеров CryoVault
#[derive(Parser, Debug)]
#[command(name = "cryovault", version, about = "CryoVault snapshot container CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print snapshot header and module table
    Inspect {
        #[arg(long)]
        path: PathBuf,
        /// Require this machine tag (strict open). Default: show any snapshot.
        #[arg(long)]
        machine: Option<String>,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Walk the module chain and check declared regions against the stream
    Verify {
        #[arg(long)]
        path: PathBuf,
        /// Require this machine tag (strict open)
        #[arg(long)]
        machine: Option<String>,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Copy one module's raw payload bytes into a file
    Extract {
        #[arg(long)]
        path: PathBuf,
        /// Module name
        #[arg(long)]
        module: String,
        /// Output file for the payload
        #[arg(long)]
        out: PathBuf,
    },
}
