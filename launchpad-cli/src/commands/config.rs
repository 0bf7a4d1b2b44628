//! `launchpad config`: create and inspect ~/.launchpad/config.yaml.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use launchpad_core::{config, paths::config_path, ConfigError};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the default configuration file.
    Init(ConfigInitArgs),
    /// Print the effective configuration as YAML.
    Show,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init(args) => match config::init(args.force) {
            Ok(path) => println!("✓ Wrote default config to {}", path.display()),
            Err(ConfigError::AlreadyExists { path }) => {
                anyhow::bail!(
                    "config already exists at {}; pass --force to overwrite",
                    path.display()
                );
            }
            Err(err) => return Err(err).context("failed to write config"),
        },
        ConfigCommand::Show => {
            let path = config_path(&config::home()?);
            let effective = config::load()
                .with_context(|| format!("failed to load {}", path.display()))?;
            if !path.exists() {
                println!("# {} not found; showing defaults", path.display());
            }
            print!(
                "{}",
                serde_yaml::to_string(&effective).context("failed to render config YAML")?
            );
        }
    }
    Ok(())
}
