use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{load_period, RecordSource};
use crate::models::{Expense, Income};
use crate::period::{PeriodError, PeriodKey};

use super::entry::PeriodRecordSet;
use super::events::{EventBus, Subscription};
use super::guard::FetchGuard;
use super::store::PeriodStore;
use super::summary::MonthlySummary;

/// Entry point for reading monthly data.
///
/// Owns one store, the guard in front of it and the store's subscription
/// to the mutation bus. Clones share all of it.
#[derive(Clone)]
pub struct MonthlyData {
    store: Arc<PeriodStore>,
    guard: FetchGuard,
    source: Arc<dyn RecordSource>,
    bus: EventBus,
    _subscription: Arc<Subscription>,
}

impl MonthlyData {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self::with_bus(source, EventBus::new())
    }

    /// Build on an existing bus, e.g. one shared with other caches.
    pub fn with_bus(source: Arc<dyn RecordSource>, bus: EventBus) -> Self {
        let store = Arc::new(PeriodStore::new());
        let guard = FetchGuard::new(Arc::clone(&store));

        let patched = Arc::clone(&store);
        let subscription = bus.subscribe(move |event| patched.apply(event));

        Self {
            store,
            guard,
            source,
            bus,
            _subscription: Arc::new(subscription),
        }
    }

    /// Data for a month, defaulting to the current one. Kicks off a load
    /// when the month has no entry yet; the returned snapshot then reads as
    /// loading. A month whose load failed is returned with its error and
    /// is only fetched again through `refresh`.
    pub fn use_data(&self, month: Option<u32>, year: Option<i32>) -> Result<PeriodHandle, PeriodError> {
        let key = PeriodKey::resolve(month, year)?;
        Ok(self.open(key))
    }

    pub fn open(&self, key: PeriodKey) -> PeriodHandle {
        self.ensure_loaded(key);
        let snapshot = self.store.get(&key);
        PeriodHandle {
            key,
            expenses: snapshot.expenses,
            incomes: snapshot.incomes,
            loading: snapshot.loading,
            error: snapshot.error,
            data: self.clone(),
        }
    }

    /// Start a load for `key` if it has never been loaded, was invalidated,
    /// or was left loading with no fetch behind it. Settled entries,
    /// errored ones included, are left alone.
    pub fn ensure_loaded(&self, key: PeriodKey) -> Option<JoinHandle<()>> {
        // In-flight first: a fetch that lands between the two checks then
        // reads as settled rather than as orphaned
        if self.guard.is_in_flight(&key) || !self.store.is_pending(&key) {
            return None;
        }
        let source = Arc::clone(&self.source);
        self.guard
            .request_load(key, move || async move { load_period(source.as_ref(), key).await })
    }

    /// Load `key` if needed and wait until it has settled.
    pub async fn load(&self, key: PeriodKey) -> PeriodRecordSet {
        let mut changes = self.store.changes();
        loop {
            // Re-armed every pass in case the period is invalidated while we
            // wait. A settled entry never starts another fetch here.
            self.ensure_loaded(key);
            let snapshot = self.store.get(&key);
            if !snapshot.loading {
                return snapshot;
            }
            if changes.changed().await.is_err() {
                return self.store.get(&key);
            }
        }
    }

    pub async fn summary(&self, key: PeriodKey) -> MonthlySummary {
        MonthlySummary::from_records(&self.load(key).await)
    }

    /// Current entry without triggering anything
    pub fn snapshot(&self, key: &PeriodKey) -> PeriodRecordSet {
        self.store.get(key)
    }

    /// Drop the cached month; the next access refetches.
    pub fn invalidate(&self, key: &PeriodKey) {
        if !self.guard.cancel(key) {
            self.store.invalidate(key);
        }
    }

    /// Invalidate and immediately reload.
    pub fn refresh(&self, key: PeriodKey) -> Option<JoinHandle<()>> {
        self.invalidate(&key);
        self.ensure_loaded(key)
    }

    pub fn is_loading(&self, key: &PeriodKey) -> bool {
        self.guard.is_in_flight(key)
    }

    /// Bus that record-producing flows publish to
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.store.changes()
    }

    pub fn store(&self) -> &PeriodStore {
        &self.store
    }
}

/// A month as seen by a consumer, with the actions that apply to it.
pub struct PeriodHandle {
    pub key: PeriodKey,
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
    pub loading: bool,
    pub error: Option<String>,
    data: MonthlyData,
}

impl PeriodHandle {
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        self.data.refresh(self.key)
    }

    pub fn invalidate(&self) {
        self.data.invalidate(&self.key);
    }

    pub fn summary(&self) -> MonthlySummary {
        MonthlySummary::from_records(&PeriodRecordSet {
            expenses: self.expenses.clone(),
            incomes: self.incomes.clone(),
            loading: self.loading,
            error: self.error.clone(),
        })
    }
}

impl std::fmt::Debug for PeriodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodHandle")
            .field("key", &self.key)
            .field("expenses", &self.expenses.len())
            .field("incomes", &self.incomes.len())
            .field("loading", &self.loading)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MutationEvent;
    use crate::models::RecordKind;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves fixed records and counts expense fetches, one per load.
    struct CountingSource {
        loads: AtomicUsize,
        delay: Duration,
        failing: bool,
    }

    impl CountingSource {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
                failing: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                delay: Duration::ZERO,
                failing: true,
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordSource for CountingSource {
        fn has_session(&self) -> bool {
            true
        }

        async fn fetch_expenses(&self, _period: Option<PeriodKey>) -> Result<Vec<Expense>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failing {
                anyhow::bail!("network down");
            }
            Ok(vec![Expense::new("e1", "Rent", "Housing", 1200.0, "2024-06-01")])
        }

        async fn fetch_incomes(&self, _period: Option<PeriodKey>) -> Result<Vec<Income>> {
            Ok(vec![Income::new("i1", "Salary", "Work", 4000.0).dated("2024-06-03")])
        }
    }

    fn june() -> PeriodKey {
        PeriodKey::new(5, 2024).unwrap()
    }

    #[tokio::test]
    async fn test_use_data_defaults_to_current_month() {
        let data = MonthlyData::new(CountingSource::new(0));
        let handle = data.use_data(None, None).unwrap();
        assert_eq!(handle.key, PeriodKey::current());
        assert!(handle.loading);
    }

    #[tokio::test]
    async fn test_use_data_rejects_bad_month() {
        let data = MonthlyData::new(CountingSource::new(0));
        assert!(data.use_data(Some(12), Some(2024)).is_err());
    }

    #[tokio::test]
    async fn test_near_simultaneous_access_fetches_once() {
        let source = CountingSource::new(50);
        let data = MonthlyData::new(source.clone());

        let first = data.use_data(Some(5), Some(2024)).unwrap();
        let second = data.use_data(Some(5), Some(2024)).unwrap();
        assert!(first.loading && second.loading);

        let loaded = data.load(june()).await;
        assert!(loaded.is_fresh());
        assert_eq!(loaded.expenses.len(), 1);
        assert_eq!(source.loads(), 1);

        // Fresh now; further access does not refetch
        let third = data.open(june());
        assert!(!third.loading);
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let source = CountingSource::new(0);
        let data = MonthlyData::new(source.clone());
        data.load(june()).await;

        let handle = data.open(june());
        handle.refresh().unwrap().await.unwrap();
        assert_eq!(source.loads(), 2);
        assert!(data.snapshot(&june()).is_fresh());
    }

    #[tokio::test]
    async fn test_invalidate_then_access_loads_once() {
        let source = CountingSource::new(20);
        let data = MonthlyData::new(source.clone());
        data.load(june()).await;

        data.open(june()).invalidate();
        assert!(data.snapshot(&june()).loading);

        data.open(june());
        data.open(june());
        data.load(june()).await;
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn test_load_returns_once_a_failing_fetch_settles() {
        let source = CountingSource::failing();
        let data = MonthlyData::new(source.clone());

        let loaded = tokio::time::timeout(Duration::from_secs(2), data.load(june()))
            .await
            .expect("load settles on error");

        assert!(!loaded.loading);
        assert_eq!(loaded.error.as_deref(), Some("network down"));
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_errored_month_is_reported_not_refetched() {
        let source = CountingSource::failing();
        let data = MonthlyData::new(source.clone());
        data.load(june()).await;

        let handle = data.use_data(Some(5), Some(2024)).unwrap();
        assert!(!handle.loading);
        assert_eq!(handle.error.as_deref(), Some("network down"));
        assert!(data.ensure_loaded(june()).is_none());
        assert_eq!(source.loads(), 1);

        // Retrying is explicit
        handle.refresh().unwrap().await.unwrap();
        assert_eq!(source.loads(), 2);
        assert_eq!(data.snapshot(&june()).error.as_deref(), Some("network down"));
    }

    #[tokio::test]
    async fn test_orphaned_loading_entry_is_reloaded() {
        let source = CountingSource::new(0);
        let data = MonthlyData::new(source.clone());
        data.store().set(june(), PeriodRecordSet::loading());

        let loaded = data.load(june()).await;
        assert!(loaded.is_fresh());
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_events_patch_loaded_month() {
        let data = MonthlyData::new(CountingSource::new(0));
        data.load(june()).await;

        data.events().publish(MutationEvent::RecordAdded {
            record: Expense::new("e2", "Coffee", "Food", 3.5, "2024-06-10").into(),
        });
        assert_eq!(data.snapshot(&june()).expenses.len(), 2);

        data.events().publish(MutationEvent::RecordDeleted {
            id: "i1".to_string(),
            kind: RecordKind::Income,
            period: june(),
        });
        assert!(data.snapshot(&june()).incomes.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_accessor_unsubscribes_store() {
        let bus = EventBus::new();
        let data = MonthlyData::with_bus(CountingSource::new(0), bus.clone());
        let clone = data.clone();
        assert_eq!(bus.subscriber_count(), 1);

        drop(data);
        assert_eq!(bus.subscriber_count(), 1);
        drop(clone);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_summary() {
        let data = MonthlyData::new(CountingSource::new(0));
        data.load(june()).await;
        let summary = data.open(june()).summary();
        assert_eq!(summary.balance, 2800.0);
        assert_eq!(data.summary(june()).await, summary);
    }
}
