//! Configuration for the DDS daemon
//!
//! Loaded from TOML. Every section falls back to its defaults, so an empty
//! file (or no file at all) yields a runnable single-node configuration.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration
// ============================================================================

/// Identity of this node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Externally reachable base URL of this node's DDS API
  /// Default: "http://localhost:8401/dds"
  pub base_url: String,

  /// NSA identifier owning locally authored documents
  pub nsa: String,

  /// Identifier presented to peers when subscribing
  pub requester_id: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8401/dds".to_string(),
      nsa: "urn:ogf:network:example.net:2024:nsa".to_string(),
      requester_id: "urn:ogf:network:example.net:2024:nsa".to_string(),
    }
  }
}

// ============================================================================
// Documents Configuration
// ============================================================================

/// Document lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
  /// Seconds past `expires` before a document is dropped from the repository
  /// Default: 600
  pub expiry_grace_secs: u64,

  /// How often the expiry sweep runs
  /// Default: 600
  pub expiry_sweep_interval_secs: u64,

  /// Directory of locally authored `*.json` documents (None = disabled)
  pub local_directory: Option<PathBuf>,

  /// How often the local directory is rescanned
  /// Default: 60
  pub local_audit_interval_secs: u64,

  /// Persist locally authored documents across restarts
  pub repository_enabled: bool,

  /// Repository location (None = `<data dir>/repository`)
  pub repository_dir: Option<PathBuf>,
}

impl Default for DocumentsConfig {
  fn default() -> Self {
    Self {
      expiry_grace_secs: 600,
      expiry_sweep_interval_secs: 600,
      local_directory: None,
      local_audit_interval_secs: 60,
      repository_enabled: true,
      repository_dir: None,
    }
  }
}

impl DocumentsConfig {
  pub fn expiry_grace(&self) -> Duration {
    Duration::from_secs(self.expiry_grace_secs)
  }
}

// ============================================================================
// Notifications Configuration
// ============================================================================

/// Notification dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
  /// Documents per notification when sending a full snapshot
  /// Default: 10
  pub batch_size: usize,

  /// Delivery workers (bounds concurrent outbound callbacks)
  /// Default: 4
  pub pool_size: usize,

  /// Delay before the initial snapshot of a new subscription
  /// Default: 1000
  pub initial_delay_ms: u64,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self {
      batch_size: 10,
      pool_size: 4,
      initial_delay_ms: 1000,
    }
  }
}

impl NotificationsConfig {
  pub fn initial_delay(&self) -> Duration {
    Duration::from_millis(self.initial_delay_ms)
  }
}

// ============================================================================
// Federation Configuration
// ============================================================================

/// Peer registration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
  /// Base URLs of peers this node subscribes to
  pub peers: Vec<String>,

  /// How often registrations are audited against `peers`
  /// Default: 60
  pub audit_interval_secs: u64,

  /// Registration workers
  /// Default: 2
  pub pool_size: usize,

  /// Upper bound on shutdown unsubscribes
  /// Default: 10
  pub shutdown_grace_secs: u64,

  /// Summarize repeated failures for a peer every N occurrences
  /// Default: 10
  pub failure_summary_every: u64,
}

impl Default for FederationConfig {
  fn default() -> Self {
    Self {
      peers: Vec::new(),
      audit_interval_secs: 60,
      pool_size: 2,
      shutdown_grace_secs: 10,
      failure_summary_every: 10,
    }
  }
}

// ============================================================================
// Access Configuration
// ============================================================================

/// Access control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
  /// Enforce the allow list (false = allow everything)
  pub enabled: bool,

  /// Identities permitted to perform any operation
  pub allowed: Vec<String>,

  /// Let unlisted identities read documents and subscriptions
  pub open_reads: bool,
}

impl Default for AccessConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      allowed: Vec::new(),
      open_reads: true,
    }
  }
}

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Daemon lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  pub log_level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  pub log_rotation: String,

  /// How often the config file is re-read (0 = never)
  /// Default: 30
  pub config_reload_interval_secs: u64,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_rotation: "daily".to_string(),
      config_reload_interval_secs: 30,
    }
  }
}

// ============================================================================
// Root
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub documents: DocumentsConfig,
  pub notifications: NotificationsConfig,
  pub federation: FederationConfig,
  pub access: AccessConfig,
  pub daemon: DaemonConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("Invalid config: {0}")]
  Invalid(String),
}

impl Config {
  /// Load and validate the config at `path`
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Get the user-level config path
  pub fn user_config_path() -> PathBuf {
    crate::dirs::default_config_dir().join("config.toml")
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if reqwest::Url::parse(&self.server.base_url).is_err() {
      return Err(ConfigError::Invalid(format!(
        "server.base_url is not a URL: {}",
        self.server.base_url
      )));
    }
    if self.server.nsa.trim().is_empty() {
      return Err(ConfigError::Invalid("server.nsa must not be empty".to_string()));
    }
    if self.notifications.batch_size == 0 {
      return Err(ConfigError::Invalid("notifications.batch_size must be positive".to_string()));
    }
    // The scheduler skips zero-interval tasks, so peers would never be registered with
    if self.federation.audit_interval_secs == 0 {
      return Err(ConfigError::Invalid(
        "federation.audit_interval_secs must be positive".to_string(),
      ));
    }
    for peer in &self.federation.peers {
      if reqwest::Url::parse(peer).is_err() {
        return Err(ConfigError::Invalid(format!("federation.peers entry is not a URL: {}", peer)));
      }
    }
    Ok(())
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# DDS Configuration
# Place in ~/.config/dds/config.toml or pass --config

# ============================================================================
# Server
# ============================================================================

[server]
# Externally reachable base URL of this node
base_url = "{base_url}"
# NSA that owns locally authored documents
nsa = "{nsa}"
# Identifier presented to peers when subscribing
requester_id = "{requester_id}"

# ============================================================================
# Documents
# ============================================================================

[documents]
# Seconds past expiry before a document leaves the repository
expiry_grace_secs = {grace}
expiry_sweep_interval_secs = {sweep}
# Directory of locally authored *.json documents
# local_directory = "/etc/dds/documents"
local_audit_interval_secs = {local_audit}
repository_enabled = {repository}
# repository_dir = "/var/lib/dds/repository"

# ============================================================================
# Notifications
# ============================================================================

[notifications]
# Documents per notification in a full snapshot
batch_size = {batch}
# Delivery workers (bounds concurrent callbacks)
pool_size = {notify_pool}
initial_delay_ms = {initial_delay}

# ============================================================================
# Federation
# ============================================================================

[federation]
# Peer base URLs to subscribe to
peers = []
audit_interval_secs = {audit}
pool_size = {federation_pool}
shutdown_grace_secs = {shutdown_grace}
failure_summary_every = {summary_every}

# ============================================================================
# Access
# ============================================================================

[access]
enabled = false
# allowed = ["urn:ogf:network:peer.net:2024:nsa"]
open_reads = true

# ============================================================================
# Daemon
# ============================================================================

[daemon]
# Log level: "off", "error", "warn", "info", "debug", "trace"
log_level = "{log_level}"
# Log rotation: "daily", "hourly", "never"
log_rotation = "{log_rotation}"
# Seconds between config reloads (0 = never)
config_reload_interval_secs = {reload}
"#,
      base_url = defaults.server.base_url,
      nsa = defaults.server.nsa,
      requester_id = defaults.server.requester_id,
      grace = defaults.documents.expiry_grace_secs,
      sweep = defaults.documents.expiry_sweep_interval_secs,
      local_audit = defaults.documents.local_audit_interval_secs,
      repository = defaults.documents.repository_enabled,
      batch = defaults.notifications.batch_size,
      notify_pool = defaults.notifications.pool_size,
      initial_delay = defaults.notifications.initial_delay_ms,
      audit = defaults.federation.audit_interval_secs,
      federation_pool = defaults.federation.pool_size,
      shutdown_grace = defaults.federation.shutdown_grace_secs,
      summary_every = defaults.federation.failure_summary_every,
      log_level = defaults.daemon.log_level,
      log_rotation = defaults.daemon.log_rotation,
      reload = defaults.daemon.config_reload_interval_secs,
    )
  }
}
