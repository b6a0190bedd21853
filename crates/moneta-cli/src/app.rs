//! Command handlers for the moneta CLI.
//!
//! `App` wires the configuration, the saved session, the API client and
//! the `MonthlyData` cache together. Writes go to the backend first; once
//! accepted, a `MutationEvent` is published so the cached month is patched
//! rather than refetched.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use moneta_core::api::ApiClient;
use moneta_core::auth::{Session, SessionData};
use moneta_core::cache::{MonthlySummary, PeriodRecordSet};
use moneta_core::config::Config;
use moneta_core::models::{Expense, Frequency, Income, Record, RecordKind};
use moneta_core::{MonthlyData, MutationEvent, PeriodKey};

use crate::format::{format_amount, format_date, truncate_string};

// ============================================================================
// Constants
// ============================================================================

/// Width of the description column in listings
const DESCRIPTION_WIDTH: usize = 32;

/// Width of the category column in listings
const CATEGORY_WIDTH: usize = 16;

#[derive(Serialize)]
struct MonthReport<'a> {
    period: String,
    records: &'a PeriodRecordSet,
    summary: MonthlySummary,
}

pub struct App {
    config: Config,
    session: Session,
    client: ApiClient,
    data: MonthlyData,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let mut session = Session::new(config.cache_dir()?);
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session file");
        }

        let mut client = ApiClient::new(config.api_url())?
            .with_server_filtering(config.server_side_filtering);
        if let Some(token) = session.token() {
            client.set_token(token.to_string());
        }

        let data = MonthlyData::new(Arc::new(client.clone()));

        Ok(Self {
            config,
            session,
            client,
            data,
        })
    }

    fn currency(&self) -> &str {
        self.config.currency()
    }

    fn require_session(&self) -> Result<()> {
        if !self.session.is_valid() {
            bail!("Not signed in. Run `moneta login --token <TOKEN>` first.");
        }
        Ok(())
    }

    // ===== Session =====

    pub fn login(&mut self, token: String, username: Option<String>) -> Result<()> {
        self.session.update(SessionData::new(token, username));
        self.session.save().context("Failed to save session")?;
        let minutes = self
            .session
            .data
            .as_ref()
            .map(|d| d.minutes_until_expiry())
            .unwrap_or(0);
        println!("Signed in. Session valid for {}h {}m.", minutes / 60, minutes % 60);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        self.session.clear().context("Failed to clear session")?;
        println!("Signed out.");
        Ok(())
    }

    // ===== Reading =====

    /// Load a month, retrying through `refresh` while it is in error.
    async fn load_month(&self, key: PeriodKey, retries: u32) -> PeriodRecordSet {
        let mut records = self.data.load(key).await;
        let mut attempt = 0;
        while records.error.is_some() && attempt < retries {
            attempt += 1;
            info!(period = %key, attempt, "Retrying failed period load");
            self.data.refresh(key);
            records = self.data.load(key).await;
        }
        records
    }

    pub async fn show(&self, key: PeriodKey, json: bool, retries: u32) -> Result<()> {
        if !self.session.is_valid() {
            eprintln!("Not signed in - showing an empty month. Run `moneta login` to connect.");
        }

        let records = self.load_month(key, retries).await;
        if let Some(ref error) = records.error {
            bail!("Could not load {}: {} (run again or pass --retry to try again)", key.label(), error);
        }

        if json {
            let report = MonthReport {
                period: key.label(),
                records: &records,
                summary: MonthlySummary::from_records(&records),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            self.print_month(key, &records);
        }
        Ok(())
    }

    fn print_month(&self, key: PeriodKey, records: &PeriodRecordSet) {
        let currency = self.currency();
        let summary = MonthlySummary::from_records(records);

        println!("{}", key.label());
        println!("{}", "=".repeat(key.label().len()));
        println!(
            "Income {}   Expenses {}   Balance {}",
            format_amount(currency, summary.total_income),
            format_amount(currency, summary.total_expenses),
            format_amount(currency, summary.balance),
        );
        if let Some(ratio) = summary.spent_ratio() {
            println!("Spent {:.1}% of income", ratio);
        }

        println!("\nIncomes ({})", records.incomes.len());
        for income in &records.incomes {
            println!(
                "  {:<12} {:<dw$} {:<cw$} {:>14}  {}",
                income.date.as_deref().map(format_date).unwrap_or_else(|| "-".to_string()),
                truncate_string(&income.description, DESCRIPTION_WIDTH),
                truncate_string(&income.category, CATEGORY_WIDTH),
                format_amount(currency, income.amount),
                income.recurrence_kind,
                dw = DESCRIPTION_WIDTH,
                cw = CATEGORY_WIDTH,
            );
        }

        println!("\nExpenses ({})", records.expenses.len());
        for expense in &records.expenses {
            let recurrence = expense
                .recurrence
                .as_ref()
                .map(|r| r.frequency.to_string())
                .unwrap_or_default();
            println!(
                "  {:<12} {:<dw$} {:<cw$} {:>14}  {}  [{}]",
                format_date(&expense.date),
                truncate_string(&expense.description, DESCRIPTION_WIDTH),
                truncate_string(expense.category_display(), CATEGORY_WIDTH),
                format_amount(currency, expense.amount),
                recurrence,
                expense.id,
                dw = DESCRIPTION_WIDTH,
                cw = CATEGORY_WIDTH,
            );
        }

        if !summary.by_category.is_empty() {
            println!("\nBy category");
            for category in &summary.by_category {
                println!(
                    "  {:<cw$} {:>14}  ({})",
                    truncate_string(&category.category, CATEGORY_WIDTH),
                    format_amount(currency, category.total),
                    category.count,
                    cw = CATEGORY_WIDTH,
                );
            }
        }
    }

    // ===== Writing =====

    pub async fn add_expense(
        &self,
        description: String,
        amount: f64,
        category: String,
        date: Option<NaiveDate>,
        recurring: Option<Frequency>,
    ) -> Result<()> {
        self.require_session()?;
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let key = PeriodKey::from_date(date);

        let mut draft = Expense::new("", description, category, amount, date.format("%Y-%m-%d").to_string());
        if let Some(frequency) = recurring {
            draft = draft.with_recurrence(frequency);
        }

        // Make sure the month is cached so the patch has somewhere to land
        self.data.load(key).await;
        let created = self
            .client
            .create_expense(&draft)
            .await
            .context("Failed to create expense")?;
        debug!(id = %created.id, period = %key, "Expense created");

        self.publish_added(created.into(), key).await
    }

    pub async fn add_income(
        &self,
        description: String,
        amount: f64,
        category: String,
        date: Option<NaiveDate>,
        recurring: bool,
    ) -> Result<()> {
        self.require_session()?;
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let key = PeriodKey::from_date(date);

        let mut draft = Income::new("", description, category, amount).dated(date.format("%Y-%m-%d").to_string());
        if recurring {
            draft = draft.recurring();
        }

        self.data.load(key).await;
        let mut created = self
            .client
            .create_income(&draft)
            .await
            .context("Failed to create income")?;
        // Backends that drop the date on incomes still get routed correctly
        if created.date.is_none() {
            created.date = draft.date.clone();
        }
        debug!(id = %created.id, period = %key, "Income created");

        self.publish_added(created.into(), key).await
    }

    async fn publish_added(&self, record: Record, key: PeriodKey) -> Result<()> {
        let id = record.id().to_string();
        let kind = record.kind();
        self.data.events().publish(MutationEvent::RecordAdded { record });
        println!("Added {} {}.", kind, id);
        self.show(key, false, 0).await
    }

    pub async fn delete(&self, kind: RecordKind, id: String, key: PeriodKey) -> Result<()> {
        self.require_session()?;
        self.data.load(key).await;

        self.client
            .delete_record(kind, &id)
            .await
            .with_context(|| format!("Failed to delete {} {}", kind, id))?;

        self.data.events().publish(MutationEvent::RecordDeleted {
            id: id.clone(),
            kind,
            period: key,
        });
        println!("Deleted {} {}.", kind, id);
        self.show(key, false, 0).await
    }
}
