use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use syndicate_models::market::{Bar, Quote};
use tracing::debug;

use crate::error::MarketError;

/// One headline from the news service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewsItem {
    pub headline: String,
    /// -1.0 to 1.0.
    #[serde(default)]
    pub sentiment: f64,
}

/// Upstream market data access. Mockable for tests; the provider owns
/// caching and degradation, sources just fetch.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError>;

    async fn fetch_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, MarketError>;

    async fn fetch_news(&self, symbols: &[String]) -> Result<Vec<NewsItem>, MarketError>;
}

/// HTTP-backed market source. Quotes and bars come from the data service,
/// news from a separate (optional) news service.
pub struct HttpMarketSource {
    client: reqwest::Client,
    data_base_url: String,
    news_base_url: String,
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    price: Decimal,
    #[serde(default)]
    volume: u64,
    #[serde(default)]
    as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BarPayload {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    timestamp: DateTime<Utc>,
}

impl HttpMarketSource {
    pub fn new(
        data_base_url: &str,
        news_base_url: &str,
        request_timeout: Duration,
    ) -> Result<Self, MarketError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            data_base_url: data_base_url.trim_end_matches('/').to_string(),
            news_base_url: news_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketSource for HttpMarketSource {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        let url = format!("{}/quotes/{symbol}", self.data_base_url);
        debug!(%symbol, "Fetching quote");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MarketError::Http(format!(
                "quote {symbol}: status {}",
                response.status()
            )));
        }
        let payload: QuotePayload = response.json().await?;
        Ok(Quote {
            symbol: symbol.to_string(),
            price: payload.price,
            volume: payload.volume,
            as_of: payload.as_of.unwrap_or_else(Utc::now),
        })
    }

    async fn fetch_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, MarketError> {
        let url = format!("{}/bars/{symbol}?limit={limit}", self.data_base_url);
        debug!(%symbol, limit, "Fetching bars");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MarketError::Http(format!(
                "bars {symbol}: status {}",
                response.status()
            )));
        }
        let payload: Vec<BarPayload> = response.json().await?;
        Ok(payload
            .into_iter()
            .map(|b| Bar {
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
                timestamp: b.timestamp,
            })
            .collect())
    }

    async fn fetch_news(&self, symbols: &[String]) -> Result<Vec<NewsItem>, MarketError> {
        if self.news_base_url.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/news?symbols={}", self.news_base_url, symbols.join(","));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MarketError::Http(format!(
                "news: status {}",
                response.status()
            )));
        }
        let items: Vec<NewsItem> = response.json().await?;
        Ok(items)
    }
}
