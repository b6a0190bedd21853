//! Session management.
//!
//! Signing in happens elsewhere; this module only keeps the bearer token
//! the backend issued, persisted to disk and expiring after 12 hours. No
//! valid session means the cache serves empty months rather than errors.

pub mod session;

pub use session::{Session, SessionData};
