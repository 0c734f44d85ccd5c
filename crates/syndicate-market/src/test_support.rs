//! Configurable in-memory market source for provider and cycle tests.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use syndicate_models::market::{Bar, Quote};

use crate::error::MarketError;
use crate::source::{MarketSource, NewsItem};

/// A market source serving fixed quotes/bars/news, with per-method call
/// counters and failure switches.
pub struct StaticMarketSource {
    prices: Mutex<BTreeMap<String, Decimal>>,
    bars: Mutex<BTreeMap<String, Vec<Bar>>>,
    news: Mutex<Vec<NewsItem>>,
    failing_symbols: Mutex<Vec<String>>,
    fail_all_quotes: bool,
    fail_news: bool,
    quote_calls: AtomicUsize,
    news_calls: AtomicUsize,
}

impl StaticMarketSource {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(BTreeMap::new()),
            bars: Mutex::new(BTreeMap::new()),
            news: Mutex::new(Vec::new()),
            failing_symbols: Mutex::new(Vec::new()),
            fail_all_quotes: false,
            fail_news: false,
            quote_calls: AtomicUsize::new(0),
            news_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_price(symbol: &str, price: &str) -> Self {
        Self::with_prices(&[(symbol, price)])
    }

    pub fn with_prices(pairs: &[(&str, &str)]) -> Self {
        let source = Self::new();
        {
            let mut prices = source.prices.lock().unwrap();
            for (symbol, price) in pairs {
                prices.insert(symbol.to_string(), Decimal::from_str(price).unwrap());
            }
        }
        source
    }

    /// Every quote fetch fails.
    pub fn failing() -> Self {
        let mut source = Self::new();
        source.fail_all_quotes = true;
        source
    }

    pub fn failing_news(mut self) -> Self {
        self.fail_news = true;
        self
    }

    /// Quote fetches for this one symbol fail.
    pub fn failing_symbol(self, symbol: &str) -> Self {
        self.failing_symbols.lock().unwrap().push(symbol.to_string());
        self
    }

    pub fn set_price(&self, symbol: &str, price: &str) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Decimal::from_str(price).unwrap());
    }

    pub fn set_bars(&self, symbol: &str, closes: &[f64]) {
        let bars = closes
            .iter()
            .map(|&close| Bar {
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
                timestamp: Utc::now(),
            })
            .collect();
        self.bars.lock().unwrap().insert(symbol.to_string(), bars);
    }

    pub fn set_news(&self, items: Vec<NewsItem>) {
        *self.news.lock().unwrap() = items;
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn news_calls(&self) -> usize {
        self.news_calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticMarketSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketSource for StaticMarketSource {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_quotes {
            return Err(MarketError::Http("mock quote outage".to_string()));
        }
        if self.failing_symbols.lock().unwrap().iter().any(|s| s == symbol) {
            return Err(MarketError::Http(format!("mock failure for {symbol}")));
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketError::Http(format!("no mock price for {symbol}")))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            volume: 1_000_000,
            as_of: Utc::now(),
        })
    }

    async fn fetch_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, MarketError> {
        let bars = self.bars.lock().unwrap();
        let symbol_bars = bars.get(symbol).cloned().unwrap_or_default();
        let start = symbol_bars.len().saturating_sub(limit);
        Ok(symbol_bars[start..].to_vec())
    }

    async fn fetch_news(&self, _symbols: &[String]) -> Result<Vec<NewsItem>, MarketError> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_news {
            return Err(MarketError::Http("mock news outage".to_string()));
        }
        Ok(self.news.lock().unwrap().clone())
    }
}
