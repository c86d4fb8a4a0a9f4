//! Outbound notification transport

use std::{io::Write, time::Duration};

use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use reqwest::header::{ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error("Failed to encode notification: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("Failed to compress notification: {0}")]
  Compress(#[from] std::io::Error),
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),
}

/// POSTs an encoded, gzip-compressed notification body to a callback
#[async_trait]
pub trait NotificationTransport: Send + Sync + 'static {
  /// Deliver `body` and return the HTTP status code
  async fn deliver(&self, callback: &str, media_type: &str, body: Vec<u8>) -> Result<u16, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  timeout: Duration,
}

impl HttpTransport {
  pub fn new(client: reqwest::Client) -> Self {
    Self {
      client,
      timeout: Duration::from_secs(30),
    }
  }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
  async fn deliver(&self, callback: &str, media_type: &str, body: Vec<u8>) -> Result<u16, TransportError> {
    let response = self
      .client
      .post(callback)
      .timeout(self.timeout)
      .header(CONTENT_TYPE, media_type)
      .header(ACCEPT, media_type)
      .header(CONTENT_ENCODING, "gzip")
      .body(body)
      .send()
      .await?;
    Ok(response.status().as_u16())
  }
}

/// Compress `bytes` with gzip
pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
  let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
  encoder.write_all(bytes)?;
  encoder.finish()
}
