//! `launchpad tree`: show the project mounted by `up`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use launchpad_core::project::{starter_project, STARTER_PORT};

/// Arguments for `launchpad tree`.
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Emit the descriptor as JSON instead of a file listing.
    #[arg(long)]
    pub json: bool,
}

impl TreeArgs {
    pub fn run(self) -> Result<()> {
        let tree = starter_project();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tree).context("failed to render project JSON")?
            );
            return Ok(());
        }

        for dir in tree.directories() {
            println!("{}/", dir.blue());
        }
        for (path, contents) in tree.files() {
            println!("{} {:>6} bytes", format!("{path:<16}").bold(), contents.len());
        }
        println!(
            "{}",
            format!("serves on http://localhost:{STARTER_PORT}").dimmed()
        );
        Ok(())
    }
}
