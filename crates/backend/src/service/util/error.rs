//! Error taxonomy for discovery operations.
//!
//! Every variant carries the `resource` it concerns and a human-readable
//! `description`. The HTTP layer maps errors to a status with
//! [`DiscoveryError::status`] and a body with [`DiscoveryError::body`].

use serde::{Deserialize, Serialize};

use crate::{federation::FederationError, store::StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
  #[error("Missing parameter {resource}: {description}")]
  MissingParameter { resource: String, description: String },
  #[error("Invalid parameter {resource}: {description}")]
  InvalidParameter { resource: String, description: String },
  #[error("Not found {resource}: {description}")]
  NotFound { resource: String, description: String },
  #[error("Already exists {resource}: {description}")]
  AlreadyExists { resource: String, description: String },
  #[error("Version conflict {resource}: {description}")]
  VersionConflict { resource: String, description: String },
  #[error("Unauthorized {resource}: {description}")]
  Unauthorized { resource: String, description: String },
  #[error("Remote communication failure {resource}: {description}")]
  RemoteCommunicationFailure { resource: String, description: String },
  #[error("Remote parse failure {resource}: {description}")]
  RemoteParseFailure { resource: String, description: String },
  #[error("Internal error {resource}: {description}")]
  Internal { resource: String, description: String },
}

/// Serialized error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
  pub code: u16,
  pub label: String,
  pub resource: String,
  pub description: String,
}

macro_rules! constructor {
  ($name:ident, $variant:ident) => {
    pub fn $name(resource: impl Into<String>, description: impl Into<String>) -> Self {
      Self::$variant {
        resource: resource.into(),
        description: description.into(),
      }
    }
  };
}

impl DiscoveryError {
  constructor!(missing_parameter, MissingParameter);
  constructor!(invalid_parameter, InvalidParameter);
  constructor!(not_found, NotFound);
  constructor!(already_exists, AlreadyExists);
  constructor!(version_conflict, VersionConflict);
  constructor!(unauthorized, Unauthorized);
  constructor!(remote_communication, RemoteCommunicationFailure);
  constructor!(remote_parse, RemoteParseFailure);
  constructor!(internal, Internal);

  /// Stable numeric error code
  pub fn code(&self) -> u16 {
    match self {
      Self::MissingParameter { .. } => 100,
      Self::InvalidParameter { .. } => 101,
      Self::NotFound { .. } => 102,
      Self::AlreadyExists { .. } => 103,
      Self::VersionConflict { .. } => 104,
      Self::Unauthorized { .. } => 105,
      Self::RemoteCommunicationFailure { .. } => 106,
      Self::RemoteParseFailure { .. } => 107,
      Self::Internal { .. } => 199,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::MissingParameter { .. } => "MISSING_PARAMETER",
      Self::InvalidParameter { .. } => "INVALID_PARAMETER",
      Self::NotFound { .. } => "NOT_FOUND",
      Self::AlreadyExists { .. } => "ALREADY_EXISTS",
      Self::VersionConflict { .. } => "VERSION_CONFLICT",
      Self::Unauthorized { .. } => "UNAUTHORIZED",
      Self::RemoteCommunicationFailure { .. } => "REMOTE_COMMUNICATION_FAILURE",
      Self::RemoteParseFailure { .. } => "REMOTE_PARSE_FAILURE",
      Self::Internal { .. } => "INTERNAL_ERROR",
    }
  }

  /// HTTP status the error maps to
  pub fn status(&self) -> u16 {
    match self {
      Self::MissingParameter { .. } | Self::InvalidParameter { .. } | Self::VersionConflict { .. } => 400,
      Self::Unauthorized { .. } => 401,
      Self::NotFound { .. } => 404,
      Self::AlreadyExists { .. } => 409,
      Self::RemoteCommunicationFailure { .. } | Self::RemoteParseFailure { .. } => 502,
      Self::Internal { .. } => 500,
    }
  }

  fn parts(&self) -> (&str, &str) {
    match self {
      Self::MissingParameter { resource, description }
      | Self::InvalidParameter { resource, description }
      | Self::NotFound { resource, description }
      | Self::AlreadyExists { resource, description }
      | Self::VersionConflict { resource, description }
      | Self::Unauthorized { resource, description }
      | Self::RemoteCommunicationFailure { resource, description }
      | Self::RemoteParseFailure { resource, description }
      | Self::Internal { resource, description } => (resource.as_str(), description.as_str()),
    }
  }

  pub fn resource(&self) -> &str {
    self.parts().0
  }

  pub fn description(&self) -> &str {
    self.parts().1
  }

  pub fn body(&self) -> ErrorBody {
    ErrorBody {
      code: self.code(),
      label: self.label().to_string(),
      resource: self.resource().to_string(),
      description: self.description().to_string(),
    }
  }
}

impl From<StoreError> for DiscoveryError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::AlreadyExists(key) => Self::already_exists(key.to_string(), "document already exists"),
      StoreError::NotFound(key) => Self::not_found(key.to_string(), "document does not exist"),
      StoreError::VersionConflict { key, stored, offered } => Self::version_conflict(
        key.to_string(),
        format!("version {} is not newer than stored version {}", offered, stored),
      ),
      other => Self::internal("repository", other.to_string()),
    }
  }
}

impl From<FederationError> for DiscoveryError {
  fn from(e: FederationError) -> Self {
    match &e {
      FederationError::Parse { url, .. } => Self::remote_parse(url.clone(), e.to_string()),
      FederationError::Communication { url, .. } | FederationError::Status { url, .. } => {
        Self::remote_communication(url.clone(), e.to_string())
      }
      FederationError::InvalidUrl(url) => Self::invalid_parameter(url.clone(), e.to_string()),
    }
  }
}
