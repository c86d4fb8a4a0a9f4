//! Shared utilities for the service layer.
//!
//! - `error` - Error taxonomy for discovery operations

mod error;

pub use error::{DiscoveryError, ErrorBody};
