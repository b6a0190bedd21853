use std::collections::HashMap;

use serde::Serialize;

use super::entry::PeriodRecordSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: usize,
}

/// Month totals for the dashboard header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub recurring_expenses: usize,
    pub recurring_incomes: usize,
    /// Expense totals per category, largest first
    pub by_category: Vec<CategoryTotal>,
}

impl MonthlySummary {
    pub fn from_records(records: &PeriodRecordSet) -> Self {
        let total_income: f64 = records.incomes.iter().map(|i| i.amount).sum();
        let total_expenses: f64 = records.expenses.iter().map(|e| e.amount).sum();

        let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
        for expense in &records.expenses {
            let slot = totals.entry(expense.category_display()).or_insert((0.0, 0));
            slot.0 += expense.amount;
            slot.1 += 1;
        }

        let mut by_category: Vec<CategoryTotal> = totals
            .into_iter()
            .map(|(category, (total, count))| CategoryTotal {
                category: category.to_string(),
                total,
                count,
            })
            .collect();
        by_category.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.category.cmp(&b.category))
        });

        Self {
            total_income,
            total_expenses,
            balance: total_income - total_expenses,
            recurring_expenses: records.expenses.iter().filter(|e| e.is_recurring()).count(),
            recurring_incomes: records.incomes.iter().filter(|i| i.is_recurring()).count(),
            by_category,
        }
    }

    /// Share of income spent, as a percentage. `None` with no income.
    pub fn spent_ratio(&self) -> Option<f64> {
        if self.total_income > 0.0 {
            Some(self.total_expenses / self.total_income * 100.0)
        } else {
            None
        }
    }
}
