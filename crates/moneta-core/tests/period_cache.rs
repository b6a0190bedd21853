//! End-to-end behaviour of the monthly cache against a fake backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use moneta_core::api::RecordSource;
use moneta_core::cache::{EventBus, PeriodRecordSet};
use moneta_core::models::{Expense, Income, RecordKind};
use moneta_core::{MonthlyData, MutationEvent, PeriodKey};

/// In-memory backend: per-period canned answers, failures and a delay.
#[derive(Default)]
struct FakeBackend {
    expenses: HashMap<PeriodKey, Vec<Expense>>,
    incomes: HashMap<PeriodKey, Vec<Income>>,
    failures: HashMap<PeriodKey, String>,
    delay_ms: u64,
    signed_in: bool,
    fetches: AtomicUsize,
    seen: Mutex<Vec<PeriodKey>>,
}

impl FakeBackend {
    fn signed_in() -> Self {
        Self {
            signed_in: true,
            ..Self::default()
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for FakeBackend {
    fn has_session(&self) -> bool {
        self.signed_in
    }

    async fn fetch_expenses(&self, period: Option<PeriodKey>) -> Result<Vec<Expense>> {
        let key = period.expect("fake backend always filters");
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(key);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if let Some(message) = self.failures.get(&key) {
            anyhow::bail!("{}", message);
        }
        Ok(self.expenses.get(&key).cloned().unwrap_or_default())
    }

    async fn fetch_incomes(&self, period: Option<PeriodKey>) -> Result<Vec<Income>> {
        let key = period.expect("fake backend always filters");
        Ok(self.incomes.get(&key).cloned().unwrap_or_default())
    }
}

fn key(month: u32, year: i32) -> PeriodKey {
    PeriodKey::new(month, year).unwrap()
}

fn e(id: &str, date: &str) -> Expense {
    Expense::new(id, format!("expense {}", id), "Food", 10.0, date)
}

#[tokio::test]
async fn test_load_march_returns_records() {
    let march = key(2, 2024);
    let mut backend = FakeBackend::signed_in();
    backend
        .expenses
        .insert(march, vec![e("e1", "2024-03-01"), e("e2", "2024-03-02")]);
    backend
        .incomes
        .insert(march, vec![Income::new("i1", "Salary", "Work", 100.0).dated("2024-03-05")]);
    let data = MonthlyData::new(Arc::new(backend));

    let loaded = data.load(march).await;

    assert_eq!(
        loaded,
        PeriodRecordSet::loaded(
            vec![e("e1", "2024-03-01"), e("e2", "2024-03-02")],
            vec![Income::new("i1", "Salary", "Work", 100.0).dated("2024-03-05")],
        )
    );
    let handle = data.use_data(Some(2), Some(2024)).unwrap();
    assert!(!handle.loading);
    assert_eq!(handle.error, None);
    assert_eq!(handle.expenses.len(), 2);
}

#[tokio::test]
async fn test_failing_april_stores_error() {
    let april = key(3, 2024);
    let mut backend = FakeBackend::signed_in();
    backend.failures.insert(april, "network down".to_string());
    let backend = Arc::new(backend);
    let data = MonthlyData::new(backend.clone());

    let loaded = tokio::time::timeout(Duration::from_secs(2), data.load(april))
        .await
        .expect("failed load settles");

    assert_eq!(loaded, PeriodRecordSet::failed("network down"));
    assert_eq!(backend.fetches(), 1);

    // Later accesses report the error without hitting the backend again
    let handle = data.use_data(Some(3), Some(2024)).unwrap();
    assert!(!handle.loading);
    assert_eq!(handle.error.as_deref(), Some("network down"));
    assert_eq!(data.load(april).await, PeriodRecordSet::failed("network down"));
    assert_eq!(backend.fetches(), 1);
}

#[tokio::test]
async fn test_added_event_for_unloaded_may_creates_nothing() {
    let data = MonthlyData::new(Arc::new(FakeBackend::signed_in()));

    data.events().publish(MutationEvent::RecordAdded {
        record: e("e5", "2024-05-10").into(),
    });

    assert!(!data.store().contains(&key(4, 2024)));
    assert!(data.store().keys().is_empty());
}

#[tokio::test]
async fn test_two_quick_june_accesses_fetch_once() {
    let backend = Arc::new(FakeBackend {
        delay_ms: 50,
        ..FakeBackend::signed_in()
    });
    let data = MonthlyData::new(backend.clone());

    let a = data.use_data(Some(5), Some(2024)).unwrap();
    let b = data.use_data(Some(5), Some(2024)).unwrap();
    assert!(a.loading && b.loading);

    let (first, second) = tokio::join!(data.load(key(5, 2024)), data.load(key(5, 2024)));
    assert!(first.is_fresh() && second.is_fresh());
    assert_eq!(backend.fetches(), 1);
}

#[tokio::test]
async fn test_invalidate_shows_loading_then_refetches_once() {
    let june = key(5, 2024);
    let backend = Arc::new(FakeBackend {
        delay_ms: 10,
        ..FakeBackend::signed_in()
    });
    let data = MonthlyData::new(backend.clone());
    data.load(june).await;
    assert_eq!(backend.fetches(), 1);

    let handle = data.open(june);
    handle.invalidate();
    assert!(data.snapshot(&june).loading);

    let reopened = data.open(june);
    assert!(reopened.loading);
    data.open(june);
    data.load(june).await;
    assert_eq!(backend.fetches(), 2);
}

#[tokio::test]
async fn test_signed_out_loads_empty_without_error() {
    let backend = Arc::new(FakeBackend::default());
    let data = MonthlyData::new(backend.clone());

    let loaded = data.load(key(0, 2024)).await;

    assert_eq!(loaded, PeriodRecordSet::loaded(vec![], vec![]));
    assert_eq!(backend.fetches(), 0);
}

#[tokio::test]
async fn test_add_then_delete_restores_month() {
    let march = key(2, 2024);
    let mut backend = FakeBackend::signed_in();
    backend
        .expenses
        .insert(march, vec![e("e1", "2024-03-01"), e("e2", "2024-03-02")]);
    let data = MonthlyData::new(Arc::new(backend));
    let before = data.load(march).await;

    data.events().publish(MutationEvent::RecordAdded {
        record: e("e3", "2024-03-20T12:00:00Z").into(),
    });
    assert_eq!(data.snapshot(&march).expenses.len(), 3);

    data.events().publish(MutationEvent::RecordDeleted {
        id: "e3".to_string(),
        kind: RecordKind::Expense,
        period: march,
    });
    assert_eq!(data.snapshot(&march), before);
}

#[tokio::test]
async fn test_patch_during_load_survives_fetch() {
    let march = key(2, 2024);
    let mut backend = FakeBackend::signed_in();
    backend.delay_ms = 30;
    backend.expenses.insert(march, vec![e("e1", "2024-03-01")]);
    let data = MonthlyData::new(Arc::new(backend));

    let pending = data.ensure_loaded(march).unwrap();
    data.events().publish(MutationEvent::RecordAdded {
        record: e("e2", "2024-03-15").into(),
    });
    pending.await.unwrap();

    let ids: Vec<String> = data.snapshot(&march).expenses.into_iter().map(|x| x.id).collect();
    assert_eq!(ids, vec!["e1", "e2"]);
}

#[tokio::test]
async fn test_retry_after_error_via_refresh() {
    let april = key(3, 2024);
    let mut backend = FakeBackend::signed_in();
    backend.failures.insert(april, "network down".to_string());
    let backend = Arc::new(backend);
    let data = MonthlyData::new(backend.clone());

    let failed = data.load(april).await;
    assert!(failed.error.is_some());
    assert_eq!(backend.fetches(), 1);

    data.refresh(april).unwrap().await.unwrap();
    assert_eq!(backend.fetches(), 2);
    assert_eq!(data.snapshot(&april).error.as_deref(), Some("network down"));
}

#[tokio::test]
async fn test_caches_sharing_a_bus_both_patch() {
    let march = key(2, 2024);
    let bus = EventBus::new();
    let left = MonthlyData::with_bus(Arc::new(FakeBackend::signed_in()), bus.clone());
    let right = MonthlyData::with_bus(Arc::new(FakeBackend::signed_in()), bus.clone());
    left.load(march).await;
    right.load(march).await;

    bus.publish(MutationEvent::RecordAdded {
        record: e("e9", "2024-03-09").into(),
    });

    assert_eq!(left.snapshot(&march).expenses.len(), 1);
    assert_eq!(right.snapshot(&march).expenses.len(), 1);
}
