//! Daemon lifecycle management using the actor-based architecture.
//!
//! The daemon wires the document store, subscription engine and peer
//! federation together and drives them with periodic timers.
//!
//! # Architecture
//!
//! ```text
//! Daemon
//!   ├── Discovery (operations for the HTTP layer)
//!   │     └── NotificationRouter ──▶ Pool<DeliveryWorker>
//!   ├── Federation
//!   │     └── Pool<RegistrationWorker>
//!   └── Scheduler
//!         ├── ConfigReload
//!         ├── ExpirySweep
//!         ├── LocalDirectoryAudit
//!         └── FederationAudit
//! ```
//!
//! # Lifecycle
//!
//! 1. Create master `CancellationToken`
//! 2. Open the document store, rehydrating local documents
//! 3. Start the notification router and delivery pool
//! 4. Start federation (registration pool)
//! 5. Start the scheduler
//! 6. Run until ctrl-c
//! 7. Graceful shutdown: stop timers, unregister from peers, cancel actors

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Url;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
  actor::{PeriodicTask, ScheduledTask, Scheduler},
  dirs,
  domain::{
    config::{Config, ConfigError},
    resource_url,
    subscription::SubscriptionRequest,
  },
  federation::{Federation, HttpPeerClient, PeerClient, PeerSet},
  notify::{self, DeliveryContext, HttpTransport, NotificationTransport, SubscriptionRegistry},
  service::{
    Discovery, DiscoveryParts,
    access::{self, AccessControl},
    local_audit::LocalDirectoryAudit,
  },
  store::{DocumentStore, ExpirySweep, Repository, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("Failed to open document store: {0}")]
  Store(#[from] StoreError),
  #[error("Invalid base URL {0}")]
  BaseUrl(String),
  #[error("Failed to build HTTP client: {0}")]
  Http(#[from] reqwest::Error),
}

// ============================================================================
// Configuration
// ============================================================================

/// Daemon runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Full configuration
  pub config: Config,
  /// File the configuration came from, re-read by the reload timer
  pub config_path: Option<PathBuf>,
  /// Base directory for the repository and logs
  pub data_dir: PathBuf,
}

impl RuntimeConfig {
  /// Load from `path`, or from the user config file if it exists
  pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
    let path = path.or_else(|| Some(Config::user_config_path()).filter(|p| p.exists()));
    let config = match &path {
      Some(path) => Config::load_from(path)?,
      None => Config::default(),
    };

    Ok(Self {
      config,
      config_path: path,
      data_dir: dirs::default_data_dir(),
    })
  }

  /// Run with `config` and nothing on disk but `data_dir`
  pub fn with_config(config: Config, data_dir: impl Into<PathBuf>) -> Self {
    Self {
      config,
      config_path: None,
      data_dir: data_dir.into(),
    }
  }
}

// ============================================================================
// Config Reload
// ============================================================================

/// Re-reads the config file and swaps in its peer list
pub struct ConfigReload {
  path: PathBuf,
  peers: Arc<PeerSet>,
}

impl ConfigReload {
  pub fn new(path: impl Into<PathBuf>, peers: Arc<PeerSet>) -> Self {
    Self {
      path: path.into(),
      peers,
    }
  }

  pub fn reload(&self) {
    let config = match Config::load_from(&self.path) {
      Ok(config) => config,
      Err(e) => {
        warn!(error = %e, "Config reload failed, keeping current peers");
        return;
      }
    };

    let (added, removed) = self.peers.replace(&config.federation.peers);
    for peer in &added {
      info!(peer = %peer, "Peer added");
    }
    for peer in &removed {
      info!(peer = %peer, "Peer removed");
    }
  }
}

#[async_trait]
impl PeriodicTask for ConfigReload {
  fn name(&self) -> &'static str {
    "config-reload"
  }

  async fn run_once(&mut self) {
    self.reload();
  }
}

// ============================================================================
// Daemon
// ============================================================================

/// The DDS daemon - manages the entire application lifecycle.
///
/// # Usage
///
/// ```ignore
/// let daemon = Daemon::new(RuntimeConfig::load(None)?);
/// daemon.run().await?;
/// ```
pub struct Daemon {
  runtime_config: RuntimeConfig,
}

impl Daemon {
  pub fn new(runtime_config: RuntimeConfig) -> Self {
    Self { runtime_config }
  }

  /// Start every component with HTTP transports
  pub async fn start(&self) -> Result<DaemonHandle, DaemonError> {
    let http = reqwest::Client::builder().build()?;
    self
      .start_with(
        Arc::new(HttpTransport::new(http.clone())),
        Arc::new(HttpPeerClient::new(http)),
        access::from_config(&self.runtime_config.config.access),
      )
      .await
  }

  /// Start every component over the given seams
  pub async fn start_with(
    &self,
    transport: Arc<dyn NotificationTransport>,
    client: Arc<dyn PeerClient>,
    access: Arc<dyn AccessControl>,
  ) -> Result<DaemonHandle, DaemonError> {
    let config = &self.runtime_config.config;
    let base_url = Url::parse(&config.server.base_url).map_err(|_| DaemonError::BaseUrl(config.server.base_url.clone()))?;

    info!(nsa = %config.server.nsa, base_url = %base_url, "Starting DDS daemon");
    info!(data_dir = %self.runtime_config.data_dir.display(), "Data dir");

    // Master cancellation token - propagates to all children
    let cancel = CancellationToken::new();

    let repository = if config.documents.repository_enabled {
      let dir = config
        .documents
        .repository_dir
        .clone()
        .unwrap_or_else(|| dirs::default_repository_dir(&self.runtime_config.data_dir));
      Some(Repository::open(dir).await?)
    } else {
      None
    };
    let store = Arc::new(DocumentStore::open(&config.server.nsa, repository).await?);
    let registry = Arc::new(SubscriptionRegistry::new(base_url.clone()));

    let notifier = notify::start(
      &config.notifications,
      Arc::clone(&store),
      DeliveryContext {
        provider_id: config.server.nsa.clone(),
        registry: Arc::clone(&registry),
        transport,
      },
      &cancel,
    );

    let request = SubscriptionRequest::new(
      &config.server.requester_id,
      resource_url(&base_url, &["notifications"]).to_string(),
    );
    let federation = Federation::start(&config.federation, request, client, &cancel);

    let discovery = Arc::new(Discovery::new(DiscoveryParts {
      base_url,
      store: Arc::clone(&store),
      registry,
      remote: Arc::clone(federation.remote()),
      notifier,
      access,
      initial_delay: config.notifications.initial_delay(),
    }));

    let mut tasks = vec![
      ScheduledTask::every(
        ExpirySweep::new(Arc::clone(&store), config.documents.expiry_grace()),
        Duration::from_secs(config.documents.expiry_sweep_interval_secs),
      ),
      ScheduledTask::new(
        federation.audit_task(),
        Duration::ZERO,
        Duration::from_secs(config.federation.audit_interval_secs),
      ),
    ];
    if let Some(dir) = &config.documents.local_directory {
      info!(dir = %dir.display(), "Auditing local document directory");
      tasks.push(ScheduledTask::new(
        LocalDirectoryAudit::new(dir, Arc::clone(&discovery))
          .with_state(self.runtime_config.data_dir.join("local-directory.json")),
        Duration::ZERO,
        Duration::from_secs(config.documents.local_audit_interval_secs),
      ));
    }
    if let Some(path) = &self.runtime_config.config_path {
      tasks.push(ScheduledTask::every(
        ConfigReload::new(path, Arc::clone(federation.peers())),
        Duration::from_secs(config.daemon.config_reload_interval_secs),
      ));
    }
    let scheduler = Scheduler::start(tasks, cancel.child_token());

    info!(documents = store.len(), "DDS daemon started");
    Ok(DaemonHandle {
      discovery,
      federation,
      scheduler,
      cancel,
      shutdown_grace: Duration::from_secs(config.federation.shutdown_grace_secs),
    })
  }

  /// Run the daemon until ctrl-c, then shut down
  pub async fn run(self) -> Result<(), DaemonError> {
    let handle = self.start().await?;

    if let Err(e) = signal::ctrl_c().await {
      warn!("Failed to listen for ctrl-c: {}", e);
    } else {
      info!("Received ctrl-c, shutting down...");
    }

    handle.shutdown().await;
    Ok(())
  }
}

/// A running daemon
pub struct DaemonHandle {
  discovery: Arc<Discovery>,
  federation: Federation,
  scheduler: Scheduler,
  cancel: CancellationToken,
  shutdown_grace: Duration,
}

impl DaemonHandle {
  /// Operations for the HTTP layer
  pub fn discovery(&self) -> &Arc<Discovery> {
    &self.discovery
  }

  pub fn federation(&self) -> &Federation {
    &self.federation
  }

  /// Stop timers, unregister from peers, then stop every actor
  pub async fn shutdown(self) {
    info!("Shutting down...");
    if tokio::time::timeout(self.shutdown_grace, self.scheduler.stop()).await.is_err() {
      warn!(grace_secs = self.shutdown_grace.as_secs(), "Timers still running at shutdown");
    }
    self.federation.shutdown(self.shutdown_grace).await;
    self.cancel.cancel();
    info!("Daemon shutdown complete");
  }
}
