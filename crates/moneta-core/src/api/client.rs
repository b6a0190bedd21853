//! API client for the finance backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests to list, create and delete income and expense records.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Expense, Income, RecordKind};
use crate::period::PeriodKey;

use super::{ApiError, RecordSource};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// List endpoints answer either with a bare array or wrapped in `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) => items,
            ListResponse::Wrapped { data } => data,
        }
    }
}

/// API client for the finance backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    server_filtering: bool,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            server_filtering: true,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
            server_filtering: self.server_filtering,
        }
    }

    /// Turn server-side month filtering on or off. Off means every list
    /// call fetches all records and the caller filters.
    pub fn with_server_filtering(mut self, enabled: bool) -> Self {
        self.server_filtering = enabled;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    async fn send(&self, build: impl Fn() -> RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .authorize(build())
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send request: {}", what))?;

            if response.status().as_u16() == 429 && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(request = what, retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            return Self::check_response(response).await;
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str, period: Option<PeriodKey>) -> Result<Vec<T>> {
        let url = self.url(path);
        let query: Vec<(&str, String)> = match period {
            Some(key) if self.server_filtering => vec![
                ("month", key.month_number().to_string()),
                ("year", key.year().to_string()),
            ],
            _ => Vec::new(),
        };

        let response = self
            .send(|| self.client.get(&url).query(&query), path)
            .await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response body", path))?;
        let parsed: ListResponse<T> = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse {} response", path))?;

        let items = parsed.into_vec();
        debug!(path, count = items.len(), "Fetched list");
        Ok(items)
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let response = self
            .send(|| self.client.post(&url).json(body), path)
            .await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    // ===== Data Fetching Methods =====

    pub async fn fetch_expenses(&self, period: Option<PeriodKey>) -> Result<Vec<Expense>> {
        self.get_list("expenses", period).await
    }

    pub async fn fetch_incomes(&self, period: Option<PeriodKey>) -> Result<Vec<Income>> {
        self.get_list("incomes", period).await
    }

    // ===== Mutations =====

    /// Create an expense; the backend assigns the id.
    pub async fn create_expense(&self, expense: &Expense) -> Result<Expense> {
        self.post("expenses", expense).await
    }

    /// Create an income; the backend assigns the id.
    pub async fn create_income(&self, income: &Income) -> Result<Income> {
        self.post("incomes", income).await
    }

    pub async fn delete_record(&self, kind: RecordKind, id: &str) -> Result<()> {
        let path = match kind {
            RecordKind::Expense => format!("expenses/{}", id),
            RecordKind::Income => format!("incomes/{}", id),
        };
        let url = self.url(&path);
        self.send(|| self.client.delete(&url), &path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSource for ApiClient {
    fn has_session(&self) -> bool {
        self.token.is_some()
    }

    fn supports_period_filter(&self) -> bool {
        self.server_filtering
    }

    async fn fetch_expenses(&self, period: Option<PeriodKey>) -> Result<Vec<Expense>> {
        ApiClient::fetch_expenses(self, period).await
    }

    async fn fetch_incomes(&self, period: Option<PeriodKey>) -> Result<Vec<Income>> {
        ApiClient::fetch_incomes(self, period).await
    }
}
