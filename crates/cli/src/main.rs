//! DDS CLI - Document Distribution Service daemon

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{cmd_config_init, cmd_config_show, cmd_run};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "dds")]
#[command(about = "Document Distribution Service: share versioned documents between federated peers")]
#[command(after_help = "\
QUICK START:
  dds config init                 # Write a commented config file
  dds run --foreground            # Run the daemon, logging to the console")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `dds config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective configuration
  Show {
    /// Config file (default: user config)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
  /// Write the config template
  Init {
    /// Destination (default: user config)
    #[arg(short, long)]
    path: Option<PathBuf>,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Run the daemon until ctrl-c
  Run {
    /// Config file (default: user config)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log to the console instead of the log file
    #[arg(long)]
    foreground: bool,
  },
  /// Configuration management
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    // Run sets up its own logging once the config is known
    Commands::Run { config, foreground } => cmd_run(config, foreground).await,
    Commands::Config { command } => {
      init_cli_logging();
      match command {
        ConfigCommand::Show { config } => cmd_config_show(config),
        ConfigCommand::Init { path, force } => cmd_config_init(path, force),
      }
    }
  }
}
