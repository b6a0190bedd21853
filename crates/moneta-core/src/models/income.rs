use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    #[default]
    OneTime,
    Recurring,
}

impl std::fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecurrenceKind::OneTime => write!(f, "One-time"),
            RecurrenceKind::Recurring => write!(f, "Recurring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Income {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "recurrenceKind", alias = "recurrence", default)]
    pub recurrence_kind: RecurrenceKind,
    // Older backend builds omit the date on incomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Income {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            amount,
            category: category.into(),
            recurrence_kind: RecurrenceKind::OneTime,
            date: None,
        }
    }

    pub fn dated(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn recurring(mut self) -> Self {
        self.recurrence_kind = RecurrenceKind::Recurring;
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_kind == RecurrenceKind::Recurring
    }
}
