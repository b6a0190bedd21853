use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Weekly => write!(f, "Weekly"),
            Frequency::Monthly => write!(f, "Monthly"),
            Frequency::Yearly => write!(f, "Yearly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    // Empty until the backend assigns one
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub amount: f64,
    /// ISO date (`YYYY-MM-DD`) or full RFC 3339 timestamp
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

impl Expense {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        amount: f64,
        date: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category: category.into(),
            amount,
            date: date.into(),
            recurrence: None,
        }
    }

    pub fn with_recurrence(mut self, frequency: Frequency) -> Self {
        self.recurrence = Some(Recurrence {
            frequency,
            end_date: None,
        });
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Category for grouping; blank categories are bucketed together
    pub fn category_display(&self) -> &str {
        if self.category.trim().is_empty() {
            "Uncategorized"
        } else {
            &self.category
        }
    }
}
