//! Domain types - core business entities
//!
//! This module contains the canonical domain types used throughout the application.
//! These types represent the documents, subscriptions and notifications exchanged
//! between peers and are independent of transport concerns.

pub mod config;
pub mod document;
pub mod notification;
pub mod subscription;

use chrono::{DateTime, Utc};
use reqwest::Url;

/// Build `{base}/{segments...}`, percent-encoding each segment.
pub fn resource_url(base: &Url, segments: &[&str]) -> Url {
  let mut url = base.clone();
  if let Ok(mut path) = url.path_segments_mut() {
    path.pop_if_empty().extend(segments);
  }
  url
}

/// Format a timestamp as an HTTP-date (RFC 7231 IMF-fixdate).
pub fn http_date(ts: DateTime<Utc>) -> String {
  ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP-date header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc2822(value.trim())
    .ok()
    .map(|ts| ts.with_timezone(&Utc))
}

/// Conditional-request comparison at HTTP-date (one second) resolution.
///
/// Returns true if `ts` is strictly newer than `since`.
pub fn modified_since(ts: DateTime<Utc>, since: DateTime<Utc>) -> bool {
  ts.timestamp() > since.timestamp()
}
