use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest quote for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub volume: u64,
    pub as_of: DateTime<Utc>,
}

/// One OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// Indicators computed from one symbol's bars. Any field may be absent when
/// there were not enough bars to warm the calculation up.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSet {
    pub rsi_14: Option<f64>,
    pub sma_20: Option<f64>,
    pub ema_20: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
}

/// Condensed news view attached to a context snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsDigest {
    pub headlines: Vec<String>,
    /// Mean sentiment across headlines, -1.0 to 1.0.
    pub sentiment: f64,
    pub fetched_at: DateTime<Utc>,
}

/// One snapshot of market state for a symbol set. Immutable once built:
/// a refresh produces a new snapshot, it never mutates an old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketContext {
    pub symbols: Vec<String>,
    pub quotes: BTreeMap<String, Quote>,
    pub bars: BTreeMap<String, Vec<Bar>>,
    pub indicators: BTreeMap<String, IndicatorSet>,
    /// Absent when every news source failed (graceful degradation).
    pub news: Option<NewsDigest>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl MarketContext {
    pub fn quote_price(&self, symbol: &str) -> Option<Decimal> {
        self.quotes.get(symbol).map(|q| q.price)
    }

    /// Whether the snapshot is still inside its validity window.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        age < chrono::Duration::from_std(Duration::from_secs(self.ttl_seconds))
            .unwrap_or_else(|_| chrono::Duration::seconds(0))
    }
}
