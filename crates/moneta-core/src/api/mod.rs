//! REST API client module for the finance backend.
//!
//! This module provides the `ApiClient` for listing, creating and deleting
//! income and expense records, and the `RecordSource` seam the cache loads
//! through. Requests carry the session's bearer token.

pub mod client;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::ApiError;
pub use source::{load_period, RecordSource};
