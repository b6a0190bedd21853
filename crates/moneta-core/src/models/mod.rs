//! Data models for finance records.
//!
//! - `Expense`, `Recurrence`, `Frequency`: money going out
//! - `Income`, `RecurrenceKind`: money coming in
//! - `Record`, `RecordKind`: either of the above, as carried by mutation events

pub mod expense;
pub mod income;

pub use expense::{Expense, Frequency, Recurrence};
pub use income::{Income, RecurrenceKind};

use serde::{Deserialize, Serialize};

/// Which list of a period a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Expense,
    Income,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Expense => write!(f, "expense"),
            RecordKind::Income => write!(f, "income"),
        }
    }
}

/// A single finance record of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Expense(Expense),
    Income(Income),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Expense(e) => &e.id,
            Record::Income(i) => &i.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Expense(_) => RecordKind::Expense,
            Record::Income(_) => RecordKind::Income,
        }
    }

    /// The record's date as sent by the backend, if it has one.
    pub fn date(&self) -> Option<&str> {
        match self {
            Record::Expense(e) => Some(e.date.as_str()).filter(|d| !d.is_empty()),
            Record::Income(i) => i.date.as_deref().filter(|d| !d.is_empty()),
        }
    }
}

impl From<Expense> for Record {
    fn from(expense: Expense) -> Self {
        Record::Expense(expense)
    }
}

impl From<Income> for Record {
    fn from(income: Income) -> Self {
        Record::Income(income)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_date_treats_empty_as_missing() {
        let expense = Expense::new("e1", "Rent", "Housing", 1200.0, "");
        assert_eq!(Record::from(expense).date(), None);

        let income = Income::new("i1", "Salary", "Work", 5000.0);
        assert_eq!(Record::from(income).date(), None);
    }

    #[test]
    fn test_record_tagged_json() {
        let record = Record::from(Expense::new("e1", "Rent", "Housing", 1200.0, "2024-03-01"));
        let json = serde_json::to_value(&record).expect("serialize record");
        assert_eq!(json["kind"], "expense");
        assert_eq!(json["id"], "e1");
        assert_eq!(record.kind(), RecordKind::Expense);
        assert_eq!(record.kind().to_string(), "expense");
    }
}
