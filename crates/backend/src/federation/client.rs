//! Outbound calls to a peer's subscription API

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
  StatusCode, Url,
  header::{ACCEPT, IF_MODIFIED_SINCE},
};

use crate::domain::{
  http_date, resource_url,
  subscription::{DEFAULT_ENCODING, Subscription, SubscriptionRequest},
};

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
  #[error("Invalid peer URL {0}")]
  InvalidUrl(String),
  #[error("Request to {url} failed: {source}")]
  Communication {
    url: String,
    #[source]
    source: reqwest::Error,
  },
  #[error("Unparseable response from {url}: {source}")]
  Parse {
    url: String,
    #[source]
    source: reqwest::Error,
  },
  #[error("Unexpected status {status} from {url}")]
  Status { url: String, status: u16 },
}

/// Result of a conditional GET on a remote subscription
#[derive(Debug, Clone, PartialEq)]
pub enum AuditResponse {
  /// 304: nothing changed since the last audit
  NotModified,
  /// 200: the peer returned a newer representation
  Modified(Subscription),
  /// 404: the peer no longer knows this subscription
  Gone,
}

#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
  /// `POST {peer}/subscriptions`
  async fn subscribe(&self, peer_url: &str, request: &SubscriptionRequest) -> Result<Subscription, FederationError>;

  /// `GET {peer}/subscriptions?requesterId=...`
  async fn subscriptions(&self, peer_url: &str, requester_id: &str) -> Result<Vec<Subscription>, FederationError>;

  /// `GET {href}` with `If-Modified-Since`
  async fn audit(&self, href: &str, since: DateTime<Utc>) -> Result<AuditResponse, FederationError>;

  /// `DELETE {href}`; an already missing subscription counts as success
  async fn unsubscribe(&self, href: &str) -> Result<(), FederationError>;
}

/// [`PeerClient`] speaking JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
  client: reqwest::Client,
  timeout: Duration,
}

impl HttpPeerClient {
  pub fn new(client: reqwest::Client) -> Self {
    Self {
      client,
      timeout: Duration::from_secs(30),
    }
  }

  fn subscriptions_url(peer_url: &str) -> Result<Url, FederationError> {
    let base = Url::parse(peer_url).map_err(|_| FederationError::InvalidUrl(peer_url.to_string()))?;
    Ok(resource_url(&base, &["subscriptions"]))
  }
}

fn communication(url: &Url) -> impl FnOnce(reqwest::Error) -> FederationError + '_ {
  move |source| FederationError::Communication {
    url: url.to_string(),
    source,
  }
}

fn parse(url: &Url) -> impl FnOnce(reqwest::Error) -> FederationError + '_ {
  move |source| FederationError::Parse {
    url: url.to_string(),
    source,
  }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
  async fn subscribe(&self, peer_url: &str, request: &SubscriptionRequest) -> Result<Subscription, FederationError> {
    let url = Self::subscriptions_url(peer_url)?;
    let response = self
      .client
      .post(url.clone())
      .timeout(self.timeout)
      .header(ACCEPT, DEFAULT_ENCODING)
      .json(request)
      .send()
      .await
      .map_err(communication(&url))?;

    match response.status() {
      StatusCode::OK | StatusCode::CREATED => response.json().await.map_err(parse(&url)),
      status => Err(FederationError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      }),
    }
  }

  async fn subscriptions(&self, peer_url: &str, requester_id: &str) -> Result<Vec<Subscription>, FederationError> {
    let mut url = Self::subscriptions_url(peer_url)?;
    url.query_pairs_mut().append_pair("requesterId", requester_id);

    let response = self
      .client
      .get(url.clone())
      .timeout(self.timeout)
      .header(ACCEPT, DEFAULT_ENCODING)
      .send()
      .await
      .map_err(communication(&url))?;

    match response.status() {
      StatusCode::OK => response.json().await.map_err(parse(&url)),
      StatusCode::NOT_FOUND => Ok(Vec::new()),
      status => Err(FederationError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      }),
    }
  }

  async fn audit(&self, href: &str, since: DateTime<Utc>) -> Result<AuditResponse, FederationError> {
    let url = Url::parse(href).map_err(|_| FederationError::InvalidUrl(href.to_string()))?;
    let response = self
      .client
      .get(url.clone())
      .timeout(self.timeout)
      .header(ACCEPT, DEFAULT_ENCODING)
      .header(IF_MODIFIED_SINCE, http_date(since))
      .send()
      .await
      .map_err(communication(&url))?;

    match response.status() {
      StatusCode::NOT_MODIFIED => Ok(AuditResponse::NotModified),
      StatusCode::NOT_FOUND => Ok(AuditResponse::Gone),
      StatusCode::OK => response.json().await.map(AuditResponse::Modified).map_err(parse(&url)),
      status => Err(FederationError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      }),
    }
  }

  async fn unsubscribe(&self, href: &str) -> Result<(), FederationError> {
    let url = Url::parse(href).map_err(|_| FederationError::InvalidUrl(href.to_string()))?;
    let response = self
      .client
      .delete(url.clone())
      .timeout(self.timeout)
      .send()
      .await
      .map_err(communication(&url))?;

    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_FOUND {
      Ok(())
    } else {
      Err(FederationError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      })
    }
  }
}
