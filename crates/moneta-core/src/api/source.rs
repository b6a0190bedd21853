use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::cache::PeriodRecords;
use crate::models::{Expense, Income};
use crate::period::{filter_by_period, PeriodKey};

/// Where period data comes from.
///
/// `period = None` asks for every record the backend has.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Whether a signed-in session is available
    fn has_session(&self) -> bool;

    /// Whether the backend can filter by month/year itself
    fn supports_period_filter(&self) -> bool {
        true
    }

    async fn fetch_expenses(&self, period: Option<PeriodKey>) -> Result<Vec<Expense>>;

    async fn fetch_incomes(&self, period: Option<PeriodKey>) -> Result<Vec<Income>>;
}

/// Load one month of records from `source`.
///
/// Without a session this is an empty, successful load: being signed out
/// is not a failure. When the backend cannot filter, everything is fetched
/// and the month is cut out locally.
pub async fn load_period(source: &dyn RecordSource, key: PeriodKey) -> Result<PeriodRecords> {
    if !source.has_session() {
        debug!(period = %key, "No session, returning empty period");
        return Ok(PeriodRecords::default());
    }

    if source.supports_period_filter() {
        let (expenses, incomes) =
            futures::try_join!(source.fetch_expenses(Some(key)), source.fetch_incomes(Some(key)))?;
        Ok(PeriodRecords { expenses, incomes })
    } else {
        let (expenses, incomes) =
            futures::try_join!(source.fetch_expenses(None), source.fetch_incomes(None))?;
        debug!(
            period = %key,
            expenses = expenses.len(),
            incomes = incomes.len(),
            "Filtering unfiltered records locally"
        );
        Ok(PeriodRecords {
            expenses: filter_by_period(expenses, key),
            incomes: filter_by_period(incomes, key),
        })
    }
}
