use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use syndicate_models::market::{MarketContext, NewsDigest};
use tracing::{info, warn};

use crate::error::MarketError;
use crate::indicators;
use crate::source::MarketSource;

/// Market Context Provider.
///
/// Snapshots are cached per symbol set with a TTL. Concurrent callers inside
/// the TTL window share one upstream fetch: `try_get_with` admits a single
/// loader per key and parks the rest on its result.
pub struct ContextProvider {
    source: Arc<dyn MarketSource>,
    cache: Cache<String, Arc<MarketContext>>,
    ttl: Duration,
    bar_lookback: usize,
}

impl ContextProvider {
    pub fn new(source: Arc<dyn MarketSource>, ttl: Duration, bar_lookback: usize) -> Self {
        Self {
            source,
            cache: Cache::builder().max_capacity(64).time_to_live(ttl).build(),
            ttl,
            bar_lookback,
        }
    }

    /// Get the current context for a symbol set, from cache when fresh.
    ///
    /// Fails with `DataUnavailable` only when no quote could be fetched for
    /// any symbol; missing bars, indicators, or news degrade by omission.
    pub async fn get_context(
        &self,
        symbols: &[String],
    ) -> Result<Arc<MarketContext>, MarketError> {
        let mut sorted: Vec<String> = symbols.to_vec();
        sorted.sort();
        sorted.dedup();
        let key = sorted.join(",");

        self.cache
            .try_get_with(key, async { self.build_snapshot(sorted).await.map(Arc::new) })
            .await
            .map_err(|e: Arc<MarketError>| MarketError::DataUnavailable(e.to_string()))
    }

    /// Number of snapshots currently cached.
    pub fn cached_snapshots(&self) -> u64 {
        self.cache.entry_count()
    }

    async fn build_snapshot(&self, symbols: Vec<String>) -> Result<MarketContext, MarketError> {
        let mut quotes = BTreeMap::new();
        let mut bars = BTreeMap::new();
        let mut indicator_sets = BTreeMap::new();

        for symbol in &symbols {
            match self.source.fetch_quote(symbol).await {
                Ok(quote) => {
                    quotes.insert(symbol.clone(), quote);
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "Quote fetch failed");
                }
            }

            match self.source.fetch_bars(symbol, self.bar_lookback).await {
                Ok(symbol_bars) if !symbol_bars.is_empty() => {
                    indicator_sets.insert(symbol.clone(), indicators::compute(&symbol_bars));
                    bars.insert(symbol.clone(), symbol_bars);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%symbol, error = %e, "Bar fetch failed, indicators omitted");
                }
            }
        }

        if quotes.is_empty() {
            return Err(MarketError::DataUnavailable(format!(
                "no quotes for any of {} symbols",
                symbols.len()
            )));
        }

        let news = match self.source.fetch_news(&symbols).await {
            Ok(items) if !items.is_empty() => {
                let sentiment =
                    items.iter().map(|i| i.sentiment).sum::<f64>() / items.len() as f64;
                Some(NewsDigest {
                    headlines: items.into_iter().map(|i| i.headline).collect(),
                    sentiment,
                    fetched_at: Utc::now(),
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "News fetch failed, digest omitted");
                None
            }
        };

        info!(
            symbols = symbols.len(),
            quotes = quotes.len(),
            with_news = news.is_some(),
            "Market context refreshed"
        );

        Ok(MarketContext {
            symbols,
            quotes,
            bars,
            indicators: indicator_sets,
            news,
            fetched_at: Utc::now(),
            ttl_seconds: self.ttl.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticMarketSource;

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let source = Arc::new(StaticMarketSource::with_price("AAPL", "150.00"));
        let provider = Arc::new(ContextProvider::new(
            source.clone(),
            Duration::from_secs(60),
            50,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                provider.get_context(&symbols(&["AAPL"])).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(
            source.quote_calls(),
            1,
            "single-flight: only the first caller should hit the source"
        );
    }

    #[tokio::test]
    async fn cached_within_ttl_fresh_after_expiry() {
        let source = Arc::new(StaticMarketSource::with_price("AAPL", "150.00"));
        let provider = ContextProvider::new(source.clone(), Duration::from_millis(50), 50);

        let first = provider.get_context(&symbols(&["AAPL"])).await.unwrap();
        let second = provider.get_context(&symbols(&["AAPL"])).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second), "same cached snapshot");
        assert_eq!(source.quote_calls(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let third = provider.get_context(&symbols(&["AAPL"])).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third), "superseded, not mutated");
        assert_eq!(source.quote_calls(), 2);
    }

    #[tokio::test]
    async fn news_failure_degrades_to_none() {
        let source = Arc::new(StaticMarketSource::with_price("AAPL", "150.00").failing_news());
        let provider = ContextProvider::new(source, Duration::from_secs(60), 50);

        let ctx = provider.get_context(&symbols(&["AAPL"])).await.unwrap();
        assert!(ctx.news.is_none());
        assert!(ctx.quotes.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn all_quote_sources_failing_is_data_unavailable() {
        let source = Arc::new(StaticMarketSource::failing());
        let provider = ContextProvider::new(source, Duration::from_secs(60), 50);

        let result = provider.get_context(&symbols(&["AAPL", "TSLA"])).await;
        assert!(matches!(result, Err(MarketError::DataUnavailable(_))));
    }

    #[tokio::test]
    async fn partial_quote_failure_degrades() {
        let source = Arc::new(
            StaticMarketSource::with_price("AAPL", "150.00").failing_symbol("TSLA"),
        );
        let provider = ContextProvider::new(source, Duration::from_secs(60), 50);

        let ctx = provider
            .get_context(&symbols(&["AAPL", "TSLA"]))
            .await
            .unwrap();
        assert!(ctx.quotes.contains_key("AAPL"));
        assert!(!ctx.quotes.contains_key("TSLA"));
    }

    #[tokio::test]
    async fn symbol_sets_cache_independently() {
        let source = Arc::new(StaticMarketSource::with_prices(&[
            ("AAPL", "150.00"),
            ("TSLA", "200.00"),
        ]));
        let provider = ContextProvider::new(source.clone(), Duration::from_secs(60), 50);

        provider.get_context(&symbols(&["AAPL"])).await.unwrap();
        provider.get_context(&symbols(&["TSLA"])).await.unwrap();
        // Distinct keys, one fetch each; re-reading either set hits the cache.
        assert_eq!(source.quote_calls(), 2);
        provider.get_context(&symbols(&["AAPL"])).await.unwrap();
        assert_eq!(source.quote_calls(), 2);
    }

    #[tokio::test]
    async fn symbol_order_does_not_split_the_cache() {
        let source = Arc::new(StaticMarketSource::with_prices(&[
            ("AAPL", "150.00"),
            ("TSLA", "200.00"),
        ]));
        let provider = ContextProvider::new(source.clone(), Duration::from_secs(60), 50);

        provider
            .get_context(&symbols(&["TSLA", "AAPL"]))
            .await
            .unwrap();
        provider
            .get_context(&symbols(&["AAPL", "TSLA"]))
            .await
            .unwrap();
        assert_eq!(source.quote_calls(), 2, "one fetch covering two symbols");
    }
}
