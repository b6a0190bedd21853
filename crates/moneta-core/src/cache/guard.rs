use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::period::PeriodKey;

use super::entry::PeriodRecords;
use super::store::PeriodStore;

/// A fetch that has been started and not yet landed.
struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

type InFlightMap = HashMap<PeriodKey, InFlight>;

fn lock(inflight: &Mutex<InFlightMap>) -> MutexGuard<'_, InFlightMap> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps at most one fetch per period running.
///
/// The in-flight map is separate from the store's `loading` flag: the
/// decision to fetch and the mark are taken under one lock, so a second
/// caller can never see the gap between them.
#[derive(Clone)]
pub struct FetchGuard {
    store: Arc<PeriodStore>,
    inflight: Arc<Mutex<InFlightMap>>,
}

impl FetchGuard {
    pub fn new(store: Arc<PeriodStore>) -> Self {
        Self {
            store,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_in_flight(&self, key: &PeriodKey) -> bool {
        let generation = self.store.generation(key);
        lock(&self.inflight)
            .get(key)
            .map(|f| f.generation == generation)
            .unwrap_or(false)
    }

    /// Start loading `key` unless it is fresh or already being fetched.
    ///
    /// The loader runs on the tokio runtime; this must be called from
    /// within one. Loader errors and panics end up in the entry's `error`
    /// and are never returned here. Returns the handle of the spawned
    /// task, or `None` when the call was a no-op.
    pub fn request_load<F, Fut>(&self, key: PeriodKey, loader: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<PeriodRecords>> + Send + 'static,
    {
        let mut inflight = lock(&self.inflight);

        let current = self.store.generation(&key);
        if inflight.get(&key).map(|f| f.generation == current).unwrap_or(false) {
            debug!(period = %key, "Load already in flight");
            return None;
        }
        if self.store.is_fresh(&key) {
            debug!(period = %key, "Period is fresh, skipping load");
            return None;
        }

        let generation = self.store.begin_load(key);
        info!(period = %key, generation, "Loading period");

        let store = Arc::clone(&self.store);
        let inflight_map = Arc::clone(&self.inflight);
        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(loader()).catch_unwind().await {
                Ok(Ok(records)) => {
                    debug!(
                        period = %key,
                        expenses = records.expenses.len(),
                        incomes = records.incomes.len(),
                        "Period loaded"
                    );
                    Ok(records)
                }
                Ok(Err(e)) => {
                    warn!(period = %key, error = %e, "Failed to load period");
                    Err(format!("{:#}", e))
                }
                Err(_) => {
                    warn!(period = %key, "Period loader panicked");
                    Err("Loader panicked".to_string())
                }
            };

            store.complete_load(key, generation, result);

            let mut inflight = lock(&inflight_map);
            if inflight.get(&key).map(|f| f.generation == generation).unwrap_or(false) {
                inflight.remove(&key);
            }
        });

        inflight.insert(
            key,
            InFlight {
                generation,
                abort: handle.abort_handle(),
            },
        );
        Some(handle)
    }

    /// Abort the outstanding fetch for `key`, if any, and drop the
    /// half-loaded entry with it so nobody waits on it.
    pub fn cancel(&self, key: &PeriodKey) -> bool {
        let Some(f) = lock(&self.inflight).remove(key) else {
            return false;
        };
        debug!(period = %key, generation = f.generation, "Cancelling load");
        f.abort.abort();
        self.store.invalidate(key);
        true
    }
}
