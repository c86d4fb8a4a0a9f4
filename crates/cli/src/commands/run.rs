//! Run command

use std::path::PathBuf;

use anyhow::{Context, Result};
use dds::{Daemon, RuntimeConfig};

use crate::logging::init_daemon_logging;

/// Run the daemon until ctrl-c
pub async fn cmd_run(config: Option<PathBuf>, foreground: bool) -> Result<()> {
  let runtime_config = RuntimeConfig::load(config).context("Failed to load configuration")?;
  let _guard = init_daemon_logging(&runtime_config.config.daemon, foreground);

  Daemon::new(runtime_config).run().await.context("Failed to run daemon")?;
  Ok(())
}
