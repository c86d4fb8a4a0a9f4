//! Config commands

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use dds::config::Config;

/// Print the effective configuration as TOML
pub fn cmd_config_show(path: Option<PathBuf>) -> Result<()> {
  let user_config = Config::user_config_path();

  let config = match &path {
    Some(path) => {
      println!("Using config: {:?}", path);
      Config::load_from(path)?
    }
    None if user_config.exists() => {
      println!("Using user config: {:?}", user_config);
      Config::load_from(&user_config)?
    }
    None => {
      println!("Using default configuration (no config file found)");
      Config::default()
    }
  };
  println!();

  let toml_str = toml::to_string_pretty(&config)?;
  println!("{}", toml_str);

  Ok(())
}

/// Write the commented config template
pub fn cmd_config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
  let config_path = path.unwrap_or_else(Config::user_config_path);

  if config_path.exists() && !force {
    bail!("Config file already exists: {:?} (use --force to overwrite)", config_path);
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
  }
  std::fs::write(&config_path, Config::generate_template())?;

  println!("Created config: {:?}", config_path);
  println!("Edit the file to set this node's NSA, base URL and peers.");

  Ok(())
}
