//! moneta - monthly income and expense views from the command line.
//!
//! Reads a month of records through the period cache, and adds or deletes
//! records on the backend, patching the cached month afterwards.

mod app;
mod format;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use moneta_core::config::Config;
use moneta_core::models::{Frequency, RecordKind};
use moneta_core::PeriodKey;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "moneta")]
#[command(about = "Monthly income and expense tracking")]
#[command(version)]
struct Cli {
    /// Path to config file (default: $XDG_CONFIG_HOME/moneta/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show incomes, expenses and totals for a month
    Show {
        /// Month, 1-12 (default: current)
        #[arg(short, long)]
        month: Option<u32>,
        /// Year (default: current)
        #[arg(short, long)]
        year: Option<i32>,
        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
        /// Times to retry a month that failed to load
        #[arg(long, default_value_t = 0)]
        retry: u32,
    },
    /// Record an expense
    AddExpense {
        description: String,
        #[arg(short, long)]
        amount: f64,
        #[arg(short, long, default_value = "General")]
        category: String,
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Make the expense recurring
        #[arg(long, value_enum)]
        recurring: Option<FrequencyArg>,
    },
    /// Record an income
    AddIncome {
        description: String,
        #[arg(short, long)]
        amount: f64,
        #[arg(short, long, default_value = "General")]
        category: String,
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        recurring: bool,
    },
    /// Delete a record from the month it belongs to
    Delete {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
        #[arg(short, long)]
        month: Option<u32>,
        #[arg(short, long)]
        year: Option<i32>,
    },
    /// Save a backend access token
    Login {
        #[arg(long, env = "MONETA_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Forget the saved access token
    Logout,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Expense,
    Income,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Expense => RecordKind::Expense,
            KindArg::Income => RecordKind::Income,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FrequencyArg {
    Weekly,
    Monthly,
    Yearly,
}

impl From<FrequencyArg> for Frequency {
    fn from(frequency: FrequencyArg) -> Self {
        match frequency {
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Monthly => Frequency::Monthly,
            FrequencyArg::Yearly => Frequency::Yearly,
        }
    }
}

/// Turn a 1-based command line month into a period key
fn period_from_args(month: Option<u32>, year: Option<i32>) -> Result<PeriodKey> {
    let month0 = match month {
        Some(m) if (1..=12).contains(&m) => Some(m - 1),
        Some(m) => bail!("Month must be between 1 and 12, got {}", m),
        None => None,
    };
    Ok(PeriodKey::resolve(month0, year)?)
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// The returned guard flushes the log file and must outlive main's work.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "moneta.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    }
    .with_env();
    info!(api = config.api_url(), "moneta starting");

    let mut app = App::new(config)?;

    match cli.command {
        Command::Show { month, year, json, retry } => {
            app.show(period_from_args(month, year)?, json, retry).await
        }
        Command::AddExpense { description, amount, category, date, recurring } => {
            app.add_expense(description, amount, category, date, recurring.map(Into::into))
                .await
        }
        Command::AddIncome { description, amount, category, date, recurring } => {
            app.add_income(description, amount, category, date, recurring).await
        }
        Command::Delete { kind, id, month, year } => {
            app.delete(kind.into(), id, period_from_args(month, year)?).await
        }
        Command::Login { token, username } => app.login(token, username),
        Command::Logout => app.logout(),
    }
}
