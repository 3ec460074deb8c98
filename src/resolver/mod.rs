//! Color resolution for attribute-matched listings.
//!
//! The resolver is the only part of matching that performs I/O. Deferred color data
//! is fetched at most once per distinct URL for the lifetime of a resolver, so one
//! resolver should be created per batch pass.

use crate::model::{ColorInfo, ColorOption, Listing};
use crate::normalizer::{Normalizer, SynonymTables};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::timeout;
use tracing::{debug, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of checking a listing against the requested color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutcome {
    pub accept: bool,
    pub price: Option<String>,
    pub url: String,
    /// Label of the confirmed option, if a color check took place.
    pub color: Option<String>,
}

impl ResolvedOutcome {
    fn reject(listing: &Listing) -> Self {
        Self {
            accept: false,
            price: None,
            url: listing.url.clone(),
            color: None,
        }
    }
}

pub struct ColorResolver {
    normalizer: Arc<Normalizer>,
    tables: Arc<SynonymTables>,
    fetch_timeout: Duration,
    cache: Mutex<HashMap<String, Arc<OnceCell<Vec<ColorOption>>>>>,
}

impl ColorResolver {
    pub fn new(normalizer: Arc<Normalizer>, tables: Arc<SynonymTables>, fetch_timeout: Duration) -> Self {
        Self {
            normalizer,
            tables,
            fetch_timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Accepts `listing` when `desired` is absent or offered as an enabled option.
    pub async fn resolve_color(&self, listing: &Listing, desired: Option<&str>) -> ResolvedOutcome {
        let Some(desired) = desired else {
            return ResolvedOutcome {
                accept: true,
                price: listing.price.clone(),
                url: listing.url.clone(),
                color: None,
            };
        };

        let wanted = self.color_forms(desired);
        let options = self.options(listing).await;

        match options
            .iter()
            .find(|o| o.enabled && self.same_color(&wanted, &o.label))
        {
            Some(option) => {
                debug!("'{}' confirmed as '{}' at {}", desired, option.label, listing.url);
                ResolvedOutcome {
                    accept: true,
                    price: option.price.clone().or_else(|| listing.price.clone()),
                    url: option.url.clone().unwrap_or_else(|| listing.url.clone()),
                    color: Some(option.label.clone()),
                }
            }
            None => {
                debug!(
                    "'{}' not available at {} (options: {:?})",
                    desired,
                    listing.url,
                    options.iter().map(|o| o.label.as_str()).collect::<Vec<_>>()
                );
                ResolvedOutcome::reject(listing)
            }
        }
    }

    /// Number of distinct URLs whose colors were requested.
    pub async fn cached_urls(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn options(&self, listing: &Listing) -> Vec<ColorOption> {
        match &listing.color_info {
            None => Vec::new(),
            Some(ColorInfo::Inline(options)) => options.clone(),
            Some(ColorInfo::Deferred(provider)) => {
                let cell = {
                    let mut cache = self.cache.lock().await;
                    cache.entry(listing.url.clone()).or_default().clone()
                };
                cell.get_or_init(|| async {
                    match timeout(self.fetch_timeout, provider.fetch_colors(&listing.url)).await {
                        Ok(Ok(options)) => options,
                        Ok(Err(e)) => {
                            warn!("color fetch failed for {}: {}", listing.url, e);
                            Vec::new()
                        }
                        Err(_) => {
                            warn!("color fetch timed out after {:?} for {}", self.fetch_timeout, listing.url);
                            Vec::new()
                        }
                    }
                })
                .await
                .clone()
            }
        }
    }

    /// Normalized literal form and canonical key of a color label.
    fn color_forms(&self, label: &str) -> (String, String) {
        let literal = self.normalizer.normalize(label);
        let key = self.tables.colors.synonym_match(label, &self.normalizer);
        (literal, key)
    }

    fn same_color(&self, wanted: &(String, String), label: &str) -> bool {
        let (literal, key) = self.color_forms(label);
        !literal.is_empty() && (literal == wanted.0 || key == wanted.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScraperError;
    use crate::scraper::ColorProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        options: Vec<ColorOption>,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(options: Vec<ColorOption>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                options,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait::async_trait]
    impl ColorProvider for CountingProvider {
        async fn fetch_colors(&self, _url: &str) -> Result<Vec<ColorOption>, ScraperError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.options.clone())
        }
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl ColorProvider for FailingProvider {
        async fn fetch_colors(&self, _url: &str) -> Result<Vec<ColorOption>, ScraperError> {
            Err(ScraperError::InvalidResponse(503))
        }
    }

    fn resolver(fetch_timeout: Duration) -> ColorResolver {
        let normalizer = Arc::new(Normalizer::default());
        let tables = Arc::new(SynonymTables::builtin(&normalizer).unwrap());
        ColorResolver::new(normalizer, tables, fetch_timeout)
    }

    fn listing() -> Listing {
        Listing::new("Surface Pro 11", "https://shop.ir/p/11").with_price("52000000")
    }

    #[tokio::test]
    async fn test_absent_color_accepts_listing_as_is() {
        let outcome = resolver(DEFAULT_FETCH_TIMEOUT).resolve_color(&listing(), None).await;
        assert_eq!(
            outcome,
            ResolvedOutcome {
                accept: true,
                price: Some("52000000".into()),
                url: "https://shop.ir/p/11".into(),
                color: None,
            }
        );
    }

    #[tokio::test]
    async fn test_cross_language_match() {
        let r = resolver(DEFAULT_FETCH_TIMEOUT);
        let persian = listing().with_inline_colors(vec![ColorOption::new("پلاتینیوم", true)]);
        assert!(r.resolve_color(&persian, Some("Platinum")).await.accept);

        let english = listing().with_inline_colors(vec![ColorOption::new("Black", true)]);
        assert!(r.resolve_color(&english, Some("مشکی")).await.accept);
        assert!(!r.resolve_color(&english, Some("پلاتینی")).await.accept);
    }

    #[tokio::test]
    async fn test_unknown_color_matches_literally() {
        let r = resolver(DEFAULT_FETCH_TIMEOUT);
        let l = listing().with_inline_colors(vec![ColorOption::new("Forest Green", true)]);
        assert!(r.resolve_color(&l, Some("forest-green")).await.accept);
        assert!(!r.resolve_color(&l, Some("green")).await.accept);
    }

    #[tokio::test]
    async fn test_disabled_option_rejects() {
        let l = listing().with_inline_colors(vec![ColorOption::new("Platinum", false)]);
        let outcome = resolver(DEFAULT_FETCH_TIMEOUT).resolve_color(&l, Some("platinum")).await;
        assert!(!outcome.accept);
    }

    #[tokio::test]
    async fn test_missing_color_info_rejects() {
        let outcome = resolver(DEFAULT_FETCH_TIMEOUT).resolve_color(&listing(), Some("platinum")).await;
        assert!(!outcome.accept);
    }

    #[tokio::test]
    async fn test_variant_price_and_url_win() {
        let option = ColorOption::new("مشکی", true)
            .with_price("61500000")
            .with_url("https://shop.ir/p/11?color=black");
        let l = listing().with_inline_colors(vec![option]);
        let outcome = resolver(DEFAULT_FETCH_TIMEOUT).resolve_color(&l, Some("Black")).await;
        assert_eq!(outcome.price.as_deref(), Some("61500000"));
        assert_eq!(outcome.url, "https://shop.ir/p/11?color=black");
        assert_eq!(outcome.color.as_deref(), Some("مشکی"));
    }

    #[tokio::test]
    async fn test_deferred_colors_fetched_once_per_url() {
        let provider = Arc::new(CountingProvider::new(vec![ColorOption::new("Platinum", true)]));
        let r = resolver(DEFAULT_FETCH_TIMEOUT);
        let l = listing().with_deferred_colors(provider.clone());

        assert!(r.resolve_color(&l, Some("platinum")).await.accept);
        assert!(!r.resolve_color(&l, Some("black")).await.accept);
        assert!(r.resolve_color(&l, Some("پلاتینی")).await.accept);

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.cached_urls().await, 1);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out_and_rejects() {
        let mut provider = CountingProvider::new(vec![ColorOption::new("Platinum", true)]);
        provider.delay = Duration::from_millis(500);
        let l = listing().with_deferred_colors(Arc::new(provider));

        let outcome = resolver(Duration::from_millis(50)).resolve_color(&l, Some("platinum")).await;
        assert!(!outcome.accept);
    }

    #[tokio::test]
    async fn test_fetch_failure_rejects() {
        let l = listing().with_deferred_colors(Arc::new(FailingProvider));
        let outcome = resolver(DEFAULT_FETCH_TIMEOUT).resolve_color(&l, Some("platinum")).await;
        assert!(!outcome.accept);
    }
}
