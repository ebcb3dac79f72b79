use std::collections::HashMap;
use std::time::Duration;

use analysis_core::{Bar, Financials, ProviderError, Symbol};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::adapter::{ProviderAdapter, RawQuote};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://api.polygon.io";

#[derive(Clone)]
pub struct PolygonAdapter {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonAdapter {
    /// `rate_limit` is requests per minute (500 for the Starter plan, 5 on the
    /// free tier).
    pub fn new(api_key: String, rate_limit: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        self.rate_limiter.acquire("polygon").await;

        let response = self
            .client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

/// Throttling and server errors are transient; any other non-success status
/// (unknown ticker, bad key) will not improve by retrying.
fn classify_status(status: StatusCode) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transport(format!("HTTP {}", status))
    } else {
        ProviderError::Malformed(format!("HTTP {}", status))
    }
}

#[async_trait]
impl ProviderAdapter for PolygonAdapter {
    fn name(&self) -> &str {
        "polygon"
    }

    /// Snapshot endpoint: last trade, today's OHLCV and the previous session.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, ProviderError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            self.base_url, symbol
        );
        let snapshot: SnapshotResponse = self.get_json(&url, &[]).await?;
        Ok(snapshot.ticker.into_raw())
    }

    async fn fetch_bars(&self, symbol: &Symbol, days: u32) -> Result<Vec<Bar>, ProviderError> {
        // Calendar span wide enough to cover `days` sessions plus holidays
        let to = Utc::now();
        let from = to - chrono::Duration::days((days as i64 * 7) / 5 + 7);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let aggregates: AggregateResponse = self
            .get_json(&url, &[("adjusted", "true".to_string()), ("sort", "asc".to_string())])
            .await?;

        let mut bars: Vec<Bar> = aggregates
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Some(Bar {
                    timestamp: DateTime::from_timestamp_millis(r.t)?,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();

        let excess = bars.len().saturating_sub(days as usize);
        bars.drain(..excess);
        Ok(bars)
    }

    /// Ticker details carry the current market cap.
    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<f64, ProviderError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, symbol);
        let details: TickerDetailsResponse = self.get_json(&url, &[]).await?;
        details
            .results
            .market_cap
            .ok_or_else(|| ProviderError::Malformed(format!("no market cap for {}", symbol)))
    }

    async fn fetch_financials(
        &self,
        symbol: &Symbol,
        quarters: u32,
    ) -> Result<Vec<Financials>, ProviderError> {
        let url = format!("{}/vX/reference/financials", self.base_url);
        let response: FinancialsResponse = self
            .get_json(
                &url,
                &[
                    ("ticker", symbol.to_string()),
                    ("timeframe", "quarterly".to_string()),
                    ("order", "desc".to_string()),
                    ("limit", quarters.to_string()),
                ],
            )
            .await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| r.into_financials(symbol.as_str()))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: SnapshotTicker,
}

#[derive(Debug, Deserialize)]
struct SnapshotTicker {
    day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    prev_day: Option<SnapshotDay>,
    #[serde(rename = "todaysChange")]
    todays_change: Option<f64>,
    #[serde(rename = "todaysChangePerc")]
    todays_change_perc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDay {
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    v: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotLastTrade {
    p: Option<f64>,
}

impl SnapshotTicker {
    fn into_raw(self) -> RawQuote {
        // Outside market hours `day` is zeroed; fall back to the last trade
        let day = self.day.filter(|d| d.c.map_or(false, |c| c > 0.0));
        let price = self
            .last_trade
            .and_then(|t| t.p)
            .or_else(|| day.as_ref().and_then(|d| d.c));

        RawQuote {
            price,
            previous_close: self.prev_day.as_ref().and_then(|d| d.c),
            change: self.todays_change,
            change_percent: self.todays_change_perc,
            day_high: day.as_ref().and_then(|d| d.h),
            day_low: day.as_ref().and_then(|d| d.l),
            volume: day
                .as_ref()
                .and_then(|d| d.v)
                .or_else(|| self.prev_day.as_ref().and_then(|d| d.v)),
            market_cap: None,
            index: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    results: Option<Vec<AggregateResult>>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    #[serde(default)]
    fiscal_period: String,
    #[serde(default)]
    fiscal_year: String,
    #[serde(default)]
    financials: FinancialStatements,
}

#[derive(Debug, Default, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
    #[serde(default)]
    balance_sheet: HashMap<String, serde_json::Value>,
}

/// Statement line items are `{"value": .., "unit": ..}` objects.
fn line_item(statement: &HashMap<String, serde_json::Value>, key: &str) -> Option<f64> {
    statement
        .get(key)?
        .get("value")?
        .as_f64()
        .filter(|v| v.is_finite())
}

impl FinancialResult {
    fn into_financials(self, symbol: &str) -> Financials {
        let income = &self.financials.income_statement;
        let balance = &self.financials.balance_sheet;

        Financials {
            symbol: symbol.to_string(),
            fiscal_year: self.fiscal_year.parse().unwrap_or(0),
            revenue: line_item(income, "revenues"),
            net_income: line_item(income, "net_income_loss"),
            eps: line_item(income, "basic_earnings_per_share"),
            total_liabilities: line_item(balance, "liabilities"),
            shareholders_equity: line_item(balance, "equity"),
            fiscal_period: self.fiscal_period,
        }
    }
}
