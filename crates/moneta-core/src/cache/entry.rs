use serde::{Deserialize, Serialize};

use crate::models::{Expense, Income, Record, RecordKind};

/// What a loader hands back for one month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodRecords {
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
}

/// Everything the cache knows about one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecordSet {
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for PeriodRecordSet {
    /// An entry nobody has loaded yet reads as loading.
    fn default() -> Self {
        Self::loading()
    }
}

impl PeriodRecordSet {
    pub fn loading() -> Self {
        Self {
            expenses: Vec::new(),
            incomes: Vec::new(),
            loading: true,
            error: None,
        }
    }

    pub fn loaded(expenses: Vec<Expense>, incomes: Vec<Income>) -> Self {
        Self {
            expenses,
            incomes,
            loading: false,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            expenses: Vec::new(),
            incomes: Vec::new(),
            loading: false,
            error: Some(message.into()),
        }
    }

    /// Loaded without error; safe to serve without refetching
    pub fn is_fresh(&self) -> bool {
        !self.loading && self.error.is_none()
    }

    pub fn contains(&self, kind: RecordKind, id: &str) -> bool {
        match kind {
            RecordKind::Expense => self.expenses.iter().any(|e| e.id == id),
            RecordKind::Income => self.incomes.iter().any(|i| i.id == id),
        }
    }

    pub(crate) fn push(&mut self, record: Record) {
        match record {
            Record::Expense(e) => self.expenses.push(e),
            Record::Income(i) => self.incomes.push(i),
        }
    }

    /// Remove by id; returns whether anything was removed.
    pub(crate) fn remove(&mut self, kind: RecordKind, id: &str) -> bool {
        match kind {
            RecordKind::Expense => {
                let before = self.expenses.len();
                self.expenses.retain(|e| e.id != id);
                before != self.expenses.len()
            }
            RecordKind::Income => {
                let before = self.incomes.len();
                self.incomes.retain(|i| i.id != id);
                before != self.incomes.len()
            }
        }
    }
}
