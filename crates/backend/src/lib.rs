pub mod actor;
pub mod dirs;
pub mod domain;
pub mod federation;
pub mod notify;
pub mod service;
pub mod store;

pub use domain::config;

mod daemon;
pub use daemon::{ConfigReload, Daemon, DaemonError, DaemonHandle, RuntimeConfig};
