//! Prints the merged configuration as JSON.

use anyhow::Result;
use clap::Args;

use super::load_config;

/// Arguments for the show-config command.
#[derive(Args, Debug, Clone)]
pub struct ShowConfigArgs {
    /// Configuration file (TOML); defaults to config/Sepsis3.toml when present
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Runs the show-config command.
pub fn run_show_config(args: ShowConfigArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
