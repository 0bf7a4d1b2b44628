//! Launchpad: boot a sandbox, install a project, and serve it.
//!
//! # Usage
//!
//! ```text
//! launchpad up [--dir <path>] [--keep] [--log-json]
//! launchpad tree [--json]
//! launchpad config init [--force]
//! launchpad config show
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, tree::TreeArgs, up::UpArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "launchpad",
    version,
    about = "Boot a sandbox, install a project's dependencies, and run its server",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full lifecycle: boot, mount, install, start. Blocks while serving.
    Up(UpArgs),

    /// Print the starter project that `up` mounts.
    Tree(TreeArgs),

    /// Manage ~/.launchpad/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Up(args) => args.run(),
        Commands::Tree(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
