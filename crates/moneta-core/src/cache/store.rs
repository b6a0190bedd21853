use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{Record, RecordKind};
use crate::period::PeriodKey;

use super::entry::{PeriodRecordSet, PeriodRecords};
use super::events::MutationEvent;

/// A patch that landed while its period was loading. Replayed onto the
/// fetch result so the fetch does not wipe it out.
#[derive(Debug, Clone)]
enum PendingPatch {
    Add(Record),
    Remove(RecordKind, String),
}

#[derive(Debug, Default)]
struct Slot {
    entry: PeriodRecordSet,
    pending: Vec<PendingPatch>,
    /// Load this entry is waiting on. Zero when none was started.
    generation: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<PeriodKey, Slot>,
    /// Store-wide, so a generation is never reused after its entry is
    /// dropped. A result whose slot is gone or has moved on is stale.
    last_generation: u64,
}

/// Period-keyed record cache.
///
/// Entries are created by loads only; patches never materialize an entry.
/// The lock is never held across an await point.
pub struct PeriodStore {
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
}

impl Default for PeriodStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(StoreState::default()),
            revision,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Receiver that ticks on every change to the store
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Snapshot of the entry for `key`. A period that was never loaded
    /// reads as an empty, loading entry.
    pub fn get(&self, key: &PeriodKey) -> PeriodRecordSet {
        self.state()
            .entries
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &PeriodKey) -> bool {
        self.state().entries.contains_key(key)
    }

    /// True when the period has no settled entry: absent, or still flagged
    /// as loading. Errored and loaded entries are settled.
    pub fn is_pending(&self, key: &PeriodKey) -> bool {
        self.state()
            .entries
            .get(key)
            .map(|slot| slot.entry.loading)
            .unwrap_or(true)
    }

    pub fn is_fresh(&self, key: &PeriodKey) -> bool {
        self.state()
            .entries
            .get(key)
            .map(|slot| slot.entry.is_fresh())
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<PeriodKey> {
        let mut keys: Vec<PeriodKey> = self.state().entries.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Generation of the load the entry for `key` last started, or 0.
    pub fn generation(&self, key: &PeriodKey) -> u64 {
        self.state()
            .entries
            .get(key)
            .map(|slot| slot.generation)
            .unwrap_or(0)
    }

    /// Replace the entry for `key` wholesale. A load already running for
    /// the period still lands on top of it.
    pub fn set(&self, key: PeriodKey, entry: PeriodRecordSet) {
        {
            let mut state = self.state();
            let slot = state.entries.entry(key).or_default();
            slot.entry = entry;
            slot.pending.clear();
        }
        self.notify();
    }

    /// Flag `key` as loading and return the generation the load runs under.
    ///
    /// Records already held for the period stay visible while the load runs.
    pub(crate) fn begin_load(&self, key: PeriodKey) -> u64 {
        let generation = {
            let mut state = self.state();
            state.last_generation += 1;
            let generation = state.last_generation;
            let slot = state.entries.entry(key).or_default();
            slot.entry.loading = true;
            slot.entry.error = None;
            slot.pending.clear();
            slot.generation = generation;
            generation
        };
        self.notify();
        generation
    }

    /// Land a load result. Returns false when the result belongs to a
    /// superseded generation and was dropped.
    pub(crate) fn complete_load(
        &self,
        key: PeriodKey,
        generation: u64,
        result: Result<PeriodRecords, String>,
    ) -> bool {
        {
            let mut state = self.state();
            let slot = match state.entries.get_mut(&key) {
                Some(slot) if slot.generation == generation => slot,
                other => {
                    let current = other.map(|slot| slot.generation).unwrap_or(0);
                    warn!(period = %key, generation, current, "Dropping superseded load result");
                    return false;
                }
            };

            let pending = std::mem::take(&mut slot.pending);

            let entry = match result {
                Ok(records) => {
                    let mut entry = PeriodRecordSet::loaded(records.expenses, records.incomes);
                    for patch in pending {
                        match patch {
                            PendingPatch::Add(record) => {
                                if !entry.contains(record.kind(), record.id()) {
                                    entry.push(record);
                                }
                            }
                            PendingPatch::Remove(kind, id) => {
                                entry.remove(kind, &id);
                            }
                        }
                    }
                    entry
                }
                Err(message) => PeriodRecordSet::failed(message),
            };
            slot.entry = entry;
        }
        self.notify();
        true
    }

    /// Append `record` to the period's list. No-op if the period was never
    /// loaded. Returns whether the record was applied.
    pub fn patch_add(&self, key: PeriodKey, record: Record) -> bool {
        {
            let mut state = self.state();
            let Some(slot) = state.entries.get_mut(&key) else {
                debug!(period = %key, id = record.id(), "Skipping add for unloaded period");
                return false;
            };
            if slot.entry.loading {
                slot.pending.push(PendingPatch::Add(record.clone()));
            }
            slot.entry.push(record);
        }
        self.notify();
        true
    }

    /// Remove the record with `id` from the period's list, if present.
    pub fn patch_remove(&self, key: PeriodKey, kind: RecordKind, id: &str) -> bool {
        let removed = {
            let mut state = self.state();
            let Some(slot) = state.entries.get_mut(&key) else {
                debug!(period = %key, id, "Skipping remove for unloaded period");
                return false;
            };
            if slot.entry.loading {
                slot.pending
                    .push(PendingPatch::Remove(kind, id.to_string()));
            }
            slot.entry.remove(kind, id)
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Drop the entry for `key` so the next access refetches it.
    ///
    /// Any load still running for the period is superseded, since its
    /// generation goes with the entry.
    pub fn invalidate(&self, key: &PeriodKey) -> bool {
        let existed = self.state().entries.remove(key).is_some();
        debug!(period = %key, existed, "Invalidated period");
        self.notify();
        existed
    }

    /// Patch the cache from a mutation event.
    ///
    /// Additions are routed by the record's own date; deletions by the
    /// period the publisher names. Events that cannot be routed are ignored.
    pub fn apply(&self, event: &MutationEvent) {
        match event {
            MutationEvent::RecordAdded { record } => {
                match record.date().and_then(PeriodKey::from_date_str) {
                    Some(key) => {
                        self.patch_add(key, record.clone());
                    }
                    None => {
                        debug!(id = record.id(), kind = %record.kind(), "Ignoring add event without a usable date");
                    }
                }
            }
            MutationEvent::RecordDeleted { id, kind, period } => {
                if id.trim().is_empty() {
                    debug!(period = %period, kind = %kind, "Ignoring delete event without an id");
                    return;
                }
                self.patch_remove(*period, *kind, id);
            }
        }
    }
}
