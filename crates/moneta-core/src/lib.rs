//! Moneta core - the data layer behind the monthly finance views.
//!
//! Income and expense records are loaded from the backend one calendar
//! month at a time and held in a period-keyed cache:
//!
//! - `period`: `PeriodKey` derivation and date-to-period routing
//! - `cache`: the store, the fetch guard, the mutation event bus and the
//!   `MonthlyData` accessor that application code talks to
//! - `api`: the HTTP gateway to the backend and the `RecordSource` seam
//! - `models`: `Expense`, `Income` and friends
//! - `auth`, `config`: session token and user configuration on disk

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod period;

pub use cache::{MonthlyData, MutationEvent, PeriodRecordSet};
pub use period::{PeriodError, PeriodKey};
