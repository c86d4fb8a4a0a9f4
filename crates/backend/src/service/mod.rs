//! Business logic services.
//!
//! This module contains the service layer that an HTTP front end calls
//! into, kept separate from transport concerns.
//!
//! ## Available Services
//!
//! - [`discovery`] - Document, subscription and notification operations
//! - [`access`] - Access control decisions consulted by every operation
//! - [`local_audit`] - Publishing documents from a local directory

pub mod access;
pub mod discovery;
pub mod local_audit;
pub mod util;

#[cfg(test)]
mod __tests__;

pub use discovery::{Discovery, DiscoveryParts, DocumentQuery};
pub use util::{DiscoveryError, ErrorBody};
