use std::collections::BTreeMap;
use std::time::Duration;

use analysis_core::{Bar, ProviderError, Symbol};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::adapter::{ProviderAdapter, RawQuote};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage free tier allows 5 requests per minute.
const FREE_TIER_PER_MINUTE: usize = 5;

#[derive(Clone)]
pub struct AlphaVantageAdapter {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl AlphaVantageAdapter {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(FREE_TIER_PER_MINUTE, Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, ProviderError> {
        self.rate_limiter.acquire("alphavantage").await;

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::Transport(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(ProviderError::Malformed(format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        check_throttled(&body)?;
        Ok(body)
    }
}

/// Alpha Vantage answers throttled calls with HTTP 200 and a "Note" or
/// "Information" message instead of data.
fn check_throttled(body: &serde_json::Value) -> Result<(), ProviderError> {
    for key in ["Note", "Information"] {
        if let Some(message) = body.get(key).and_then(|v| v.as_str()) {
            return Err(ProviderError::Transport(format!("throttled: {}", message)));
        }
    }
    if let Some(message) = body.get("Error Message").and_then(|v| v.as_str()) {
        return Err(ProviderError::Malformed(message.to_string()));
    }
    Ok(())
}

/// All numbers arrive as strings, percentages with a trailing `%`.
fn parse_number(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()
        .map(|s| s.trim().trim_end_matches('%'))
        .and_then(|s| s.parse::<f64>().ok())
}

#[async_trait]
impl ProviderAdapter for AlphaVantageAdapter {
    fn name(&self) -> &str {
        "alphavantage"
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, ProviderError> {
        let body = self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])
            .await?;
        let response: GlobalQuoteResponse =
            serde_json::from_value(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        response
            .quote
            .map(GlobalQuote::into_raw)
            .ok_or_else(|| ProviderError::Malformed(format!("no quote for {}", symbol)))
    }

    async fn fetch_bars(&self, symbol: &Symbol, days: u32) -> Result<Vec<Bar>, ProviderError> {
        let output_size = if days > 100 { "full" } else { "compact" };
        let body = self
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol.as_str()),
                ("outputsize", output_size),
            ])
            .await?;
        let response: DailySeriesResponse =
            serde_json::from_value(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let series = response
            .series
            .ok_or_else(|| ProviderError::Malformed(format!("no daily series for {}", symbol)))?;

        // BTreeMap keys are ISO dates, so iteration is already chronological
        let mut bars = Vec::with_capacity(series.len());
        for (date, day) in series {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| ProviderError::Malformed(format!("bad date '{}': {}", date, e)))?;
            let timestamp = date
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
                .ok_or_else(|| ProviderError::Malformed(format!("bad date {}", date)))?;
            let field = |v: &Option<String>, name: &str| {
                parse_number(v).ok_or_else(|| {
                    ProviderError::Malformed(format!("{} missing {} on {}", symbol, name, date))
                })
            };
            bars.push(Bar {
                timestamp,
                open: field(&day.open, "open")?,
                high: field(&day.high, "high")?,
                low: field(&day.low, "low")?,
                close: field(&day.close, "close")?,
                volume: field(&day.volume, "volume")?,
            });
        }

        let excess = bars.len().saturating_sub(days as usize);
        bars.drain(..excess);
        Ok(bars)
    }

    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<f64, ProviderError> {
        let body = self
            .query(&[("function", "OVERVIEW"), ("symbol", symbol.as_str())])
            .await?;
        let overview: CompanyOverview =
            serde_json::from_value(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_number(&overview.market_cap)
            .ok_or_else(|| ProviderError::Malformed(format!("no market cap for {}", symbol)))
    }
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    quote: Option<GlobalQuote>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

impl GlobalQuote {
    fn into_raw(self) -> RawQuote {
        RawQuote {
            price: parse_number(&self.price),
            previous_close: parse_number(&self.previous_close),
            change: parse_number(&self.change),
            change_percent: parse_number(&self.change_percent),
            day_high: parse_number(&self.high),
            day_low: parse_number(&self.low),
            volume: parse_number(&self.volume),
            market_cap: None,
            index: None,
        }
    }
}

/// Unknown symbols come back as `{}`.
#[derive(Debug, Deserialize)]
struct CompanyOverview {
    #[serde(rename = "MarketCapitalization", default)]
    market_cap: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Time Series (Daily)", default)]
    series: Option<BTreeMap<String, DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: Option<String>,
    #[serde(rename = "2. high")]
    high: Option<String>,
    #[serde(rename = "3. low")]
    low: Option<String>,
    #[serde(rename = "4. close")]
    close: Option<String>,
    #[serde(rename = "5. volume")]
    volume: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_quote_parses_string_numbers() {
        let body = json!({
            "Global Quote": {
                "01. symbol": "IBM",
                "03. high": "171.2000",
                "04. low": "168.9000",
                "05. price": "170.5500",
                "06. volume": "3456789",
                "08. previous close": "169.0000",
                "09. change": "1.5500",
                "10. change percent": "0.9172%"
            }
        });
        let response: GlobalQuoteResponse = serde_json::from_value(body).unwrap();
        let raw = response.quote.unwrap().into_raw();

        assert_eq!(raw.price, Some(170.55));
        assert_eq!(raw.volume, Some(3_456_789.0));
        assert_eq!(raw.change_percent, Some(0.9172));
        assert_eq!(raw.day_low, Some(168.9));
    }

    #[test]
    fn test_unparseable_numbers_become_none() {
        assert_eq!(parse_number(&Some("n/a".to_string())), None);
        assert_eq!(parse_number(&None), None);
        assert_eq!(parse_number(&Some(" -1.25% ".to_string())), Some(-1.25));
    }

    #[test]
    fn test_overview_market_cap() {
        let overview: CompanyOverview = serde_json::from_value(json!({
            "Symbol": "IBM",
            "MarketCapitalization": "156789000000",
            "PERatio": "22.4"
        }))
        .unwrap();
        assert_eq!(parse_number(&overview.market_cap), Some(1.56789e11));

        let unknown: CompanyOverview = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parse_number(&unknown.market_cap), None);
    }

    #[test]
    fn test_throttle_note_is_retryable() {
        let err = check_throttled(&json!({"Note": "Thank you for using Alpha Vantage!"}))
            .unwrap_err();
        assert!(err.retryable());

        let err = check_throttled(&json!({"Error Message": "Invalid API call."})).unwrap_err();
        assert!(!err.retryable());

        assert!(check_throttled(&json!({"Global Quote": {}})).is_ok());
    }
}
