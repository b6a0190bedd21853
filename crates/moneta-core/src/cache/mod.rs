//! Period-keyed record cache.
//!
//! Records are held per calendar month (`PeriodKey`). A month is loaded
//! on first access, at most once at a time, and then served from memory
//! until it is invalidated. Record mutations published on the `EventBus`
//! patch the loaded months in place instead of forcing a refetch.
//!
//! - `PeriodStore`: the entries, plus patch/invalidate operations
//! - `FetchGuard`: starts loads and keeps a single one per month in flight
//! - `EventBus`: `MutationEvent` publish/subscribe
//! - `MonthlyData`: what application code talks to

pub mod accessor;
pub mod entry;
pub mod events;
pub mod guard;
pub mod store;
pub mod summary;

pub use accessor::{MonthlyData, PeriodHandle};
pub use entry::{PeriodRecordSet, PeriodRecords};
pub use events::{EventBus, MutationEvent, Subscription};
pub use guard::FetchGuard;
pub use store::PeriodStore;
pub use summary::{CategoryTotal, MonthlySummary};
