//! Per-storefront orchestration.
//!
//! A row moves through query building, candidate fetching, attribute matching and
//! (when required) color resolution. Any failure ends the row as a miss; the batch
//! itself never aborts.

use crate::config::{AppConfig, ColorConfig, SourceConfig, StorefrontConfig};
use crate::matcher::{CandidateMatcher, ColorTarget, FeatureExtractor, MatchPolicy, MatchTrace, TraceEvent};
use crate::model::{CatalogEntry, ConfigError, Listing, MatchResult, MissReason};
use crate::normalizer::{Normalizer, SynonymSpec, SynonymTables};
use crate::parser::{ColorExtractor, JsonListingParser, ListingParser, PagePriceParser};
use crate::resolver::ColorResolver;
use crate::scraper::{
    ColorProvider, Fetcher, HtmlColorProvider, HtmlProductSource, JsonProductSource, ProductPagePrice, ProductSource,
    SourceTarget,
};
use crate::storage::{PriceHistory, PriceObservation, ResultTable, StorefrontColumns};

use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Where the color of a row is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorStrategy {
    Ignore,
    Title,
    Url,
    Resolve,
}

impl ColorStrategy {
    fn target(self) -> Option<ColorTarget> {
        match self {
            ColorStrategy::Title => Some(ColorTarget::Title),
            ColorStrategy::Url => Some(ColorTarget::Url),
            ColorStrategy::Ignore | ColorStrategy::Resolve => None,
        }
    }
}

impl From<&ColorConfig> for ColorStrategy {
    fn from(config: &ColorConfig) -> Self {
        match config {
            ColorConfig::Ignore => ColorStrategy::Ignore,
            ColorConfig::Title => ColorStrategy::Title,
            ColorConfig::Url => ColorStrategy::Url,
            ColorConfig::Resolve { .. } => ColorStrategy::Resolve,
        }
    }
}

/// Terminal state of one row against one storefront.
#[derive(Debug)]
pub struct RowResolution {
    pub result: Result<MatchResult, MissReason>,
    pub trace: MatchTrace,
}

impl RowResolution {
    fn miss(reason: MissReason) -> Self {
        Self {
            result: Err(reason),
            trace: MatchTrace::default(),
        }
    }
}

/// Matching rules of one storefront.
pub struct StorefrontMatcher {
    name: String,
    extractor: FeatureExtractor,
    matcher: CandidateMatcher,
    color: ColorStrategy,
    color_fallthrough: bool,
}

impl StorefrontMatcher {
    pub fn new(name: &str, extractor: FeatureExtractor, matcher: CandidateMatcher, color: ColorStrategy) -> Self {
        Self {
            name: name.to_string(),
            extractor,
            matcher: matcher.with_color_target(color.target()),
            color,
            color_fallthrough: false,
        }
    }

    pub fn with_color_fallthrough(mut self, enabled: bool) -> Self {
        self.color_fallthrough = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &MatchPolicy {
        self.matcher.policy()
    }

    /// Resolves `entry` against one storefront's candidates.
    pub async fn resolve_row(
        &self,
        entry: &CatalogEntry,
        candidates: &[Listing],
        resolver: &ColorResolver,
    ) -> RowResolution {
        if candidates.is_empty() {
            return RowResolution::miss(MissReason::NoCandidate);
        }

        let query = self.extractor.extract_query(entry);
        let desired = match self.color {
            ColorStrategy::Resolve => entry.desired_color(),
            _ => None,
        };

        let (selections, trace) = if self.color_fallthrough && desired.is_some() {
            self.matcher.ranked(&query, candidates)
        } else {
            let (selection, trace) = self.matcher.select(&query, candidates);
            (selection.into_iter().collect(), trace)
        };
        if selections.is_empty() {
            return RowResolution {
                result: Err(MissReason::NoAttributeMatch),
                trace,
            };
        }

        for selection in selections {
            let outcome = resolver.resolve_color(selection.listing, desired).await;
            if outcome.accept {
                return RowResolution {
                    result: Ok(MatchResult {
                        listing: selection.listing.clone(),
                        price: outcome.price.unwrap_or_default(),
                        url: outcome.url,
                    }),
                    trace,
                };
            }
        }

        RowResolution {
            result: Err(MissReason::ColorUnavailable),
            trace,
        }
    }
}

/// How candidates are obtained for a storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePlan {
    /// Fetched once from these category URLs and shared by every row.
    Category(Vec<String>),
    /// Fetched per row from the search endpoint.
    Search,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub storefront: String,
    pub matched: usize,
    pub misses: BTreeMap<MissReason, usize>,
}

impl RunSummary {
    pub fn total_misses(&self) -> usize {
        self.misses.values().sum()
    }
}

/// Runs the whole catalog against one storefront.
pub struct StorefrontRunner {
    matcher: StorefrontMatcher,
    source: Arc<dyn ProductSource>,
    plan: SourcePlan,
    resolver: ColorResolver,
    columns: StorefrontColumns,
    page_price: Option<ProductPagePrice>,
    delay: Duration,
    jitter: Duration,
}

impl StorefrontRunner {
    pub fn new(
        matcher: StorefrontMatcher,
        source: Arc<dyn ProductSource>,
        plan: SourcePlan,
        resolver: ColorResolver,
        columns: StorefrontColumns,
    ) -> Self {
        Self {
            matcher,
            source,
            plan,
            resolver,
            columns,
            page_price: None,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Pause between per-row source fetches, plus a random extra of up to `jitter`.
    pub fn with_delay(mut self, delay: Duration, jitter: Duration) -> Self {
        self.delay = delay;
        self.jitter = jitter;
        self
    }

    /// Looks up prices on the product page when the matched listing has none.
    pub fn with_page_price(mut self, page_price: ProductPagePrice) -> Self {
        self.page_price = Some(page_price);
        self
    }

    /// Wires a storefront from configuration: its normalizer, synonym tables,
    /// matcher, listing source and optional color and price lookups.
    pub fn from_config(
        config: &StorefrontConfig,
        app: &AppConfig,
        synonyms: &SynonymSpec,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ConfigError> {
        let normalizer = Arc::new(
            Normalizer::default()
                .with_substitutions(config.substitutions.iter().map(|(p, r)| (p.as_str(), r.as_str())))?,
        );

        let mut spec = synonyms.clone();
        spec.merge(SynonymSpec {
            colors: config.color_synonyms.clone(),
            ..Default::default()
        });
        let tables = Arc::new(SynonymTables::build(&spec, &normalizer)?);

        let mut matcher = CandidateMatcher::new(normalizer.clone(), config.policy.clone())
            .with_numeric_guard(config.numeric_guard);
        if let Some(exclusions) = &config.exclusions {
            matcher = matcher.with_exclusions(exclusions.iter().map(String::as_str));
        }
        let storefront = StorefrontMatcher::new(
            &config.name,
            FeatureExtractor::new(normalizer.clone(), tables.clone()),
            matcher,
            ColorStrategy::from(&config.color),
        )
        .with_color_fallthrough(config.color_fallthrough);

        let colors: Option<Arc<dyn ColorProvider>> = match &config.color {
            ColorConfig::Resolve { extractor: Some(extractor) } => Some(Arc::new(HtmlColorProvider::new(
                fetcher.clone(),
                ColorExtractor::new(extractor)?,
            ))),
            _ => None,
        };
        let (pagination, search_pattern, plan) = match &config.source {
            SourceConfig::Category { urls, pagination } => (pagination.clone(), None, SourcePlan::Category(urls.clone())),
            SourceConfig::Search { url_pattern } => (None, Some(url_pattern.as_str()), SourcePlan::Search),
        };
        let page_delay = Duration::from_millis(config.page_delay_ms);

        let source: Arc<dyn ProductSource> = match (&config.selectors, &config.json) {
            (None, Some(fields)) => {
                let parser = JsonListingParser::new(fields, config.base_url.as_deref());
                let mut source = JsonProductSource::new(&config.name, fetcher.clone(), parser).with_page_delay(page_delay);
                if let Some(p) = pagination {
                    source = source.with_pagination(p);
                }
                if let Some(pattern) = search_pattern {
                    source = source.with_search_pattern(pattern);
                }
                if let Some(provider) = colors {
                    source = source.with_color_provider(provider);
                }
                Arc::new(source)
            }
            (Some(selectors), None) => {
                let parser = ListingParser::new(selectors, config.base_url.as_deref())?;
                let mut source = HtmlProductSource::new(&config.name, fetcher.clone(), parser).with_page_delay(page_delay);
                if let Some(p) = pagination {
                    source = source.with_pagination(p);
                }
                if let Some(pattern) = search_pattern {
                    source = source.with_search_pattern(pattern);
                }
                if let Some(provider) = colors {
                    source = source.with_color_provider(provider);
                }
                Arc::new(source)
            }
            _ => {
                return Err(ConfigError::Invalid {
                    field: config.name.clone(),
                    reason: "exactly one of selectors or json is required".to_string(),
                })
            }
        };

        let resolver = ColorResolver::new(
            normalizer,
            tables,
            Duration::from_secs(app.fetch_timeout_seconds),
        );

        let mut runner = Self::new(
            storefront,
            source,
            plan,
            resolver,
            StorefrontColumns::new(&config.name, &config.price_column, &config.url_column),
        )
        .with_delay(
            Duration::from_millis(app.request_delay_ms),
            Duration::from_millis(app.delay_jitter_ms),
        );
        if !config.page_price.is_empty() {
            let parser = PagePriceParser::new(&config.page_price)?;
            runner = runner.with_page_price(ProductPagePrice::new(fetcher, parser));
        }
        Ok(runner)
    }

    pub fn name(&self) -> &str {
        self.matcher.name()
    }

    pub fn columns(&self) -> &StorefrontColumns {
        &self.columns
    }

    /// Resolves every entry, writing each finalized row into `table` as soon as it is known.
    pub async fn run(
        &self,
        entries: &[CatalogEntry],
        table: Arc<Mutex<ResultTable>>,
        history: Option<Arc<Mutex<PriceHistory>>>,
    ) -> RunSummary {
        let name = self.name().to_string();
        info!("[{}] processing {} rows ({:?} policy)", name, entries.len(), self.matcher.policy());

        let shared = match &self.plan {
            SourcePlan::Category(urls) => Some(self.fetch_categories(urls).await),
            SourcePlan::Search => None,
        };

        let mut summary = RunSummary {
            storefront: name.clone(),
            ..Default::default()
        };

        for (row, entry) in entries.iter().enumerate() {
            let mut resolution = match &shared {
                Some(Some(listings)) => self.matcher.resolve_row(entry, listings, &self.resolver).await,
                Some(None) => RowResolution::miss(MissReason::SourceFetchFailure),
                None => {
                    if row > 0 {
                        self.pause().await;
                    }
                    let target = SourceTarget::Search(search_query(entry));
                    match self.source.list_candidates(&target).await {
                        Ok(listings) => self.matcher.resolve_row(entry, &listings, &self.resolver).await,
                        Err(e) => {
                            warn!("[{}] search failed for '{}': {}", name, entry, e);
                            RowResolution::miss(MissReason::SourceFetchFailure)
                        }
                    }
                }
            };

            log_trace(&name, entry, &resolution.trace);
            if let (Ok(result), Some(page_price)) = (&mut resolution.result, &self.page_price) {
                if result.price.is_empty() {
                    self.fill_price(page_price, result).await;
                }
            }
            match &resolution.result {
                Ok(result) => {
                    info!("[{}] ✅ {} -> {} ({})", name, entry, result.price, result.url);
                    summary.matched += 1;
                    if let Some(history) = &history {
                        self.record_history(history, entry, result).await;
                    }
                }
                Err(reason) => {
                    info!("[{}] ❌ {}: {}", name, entry, reason);
                    *summary.misses.entry(*reason).or_default() += 1;
                }
            }

            table
                .lock()
                .await
                .record(row, &self.columns.storefront, resolution.result.as_ref().ok());
        }

        info!(
            "[{}] done: {} matched, {} not found, {} product pages checked for color",
            name,
            summary.matched,
            summary.total_misses(),
            self.resolver.cached_urls().await
        );
        summary
    }

    /// Listings of every category URL; `None` when no category could be fetched.
    async fn fetch_categories(&self, urls: &[String]) -> Option<Vec<Listing>> {
        let mut listings = Vec::new();
        let mut fetched = false;
        for url in urls {
            match self.source.list_candidates(&SourceTarget::Category(url.clone())).await {
                Ok(found) => {
                    fetched = true;
                    listings.extend(found);
                }
                Err(e) => warn!("[{}] category {} failed: {}", self.name(), url, e),
            }
        }
        fetched.then_some(listings)
    }

    async fn fill_price(&self, page_price: &ProductPagePrice, result: &mut MatchResult) {
        match page_price.fetch_price(&result.url).await {
            Ok(Some(price)) => result.price = price,
            Ok(None) => debug!("[{}] no price on {}", self.name(), result.url),
            Err(e) => warn!("[{}] product page price failed for {}: {}", self.name(), result.url, e),
        }
    }

    async fn pause(&self) {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::rng().random_range(0..=jitter_ms)
        } else {
            0
        };
        let wait = self.delay + Duration::from_millis(extra);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn record_history(&self, history: &Mutex<PriceHistory>, entry: &CatalogEntry, result: &MatchResult) {
        let observation = PriceObservation {
            storefront: self.columns.storefront.clone(),
            catalog_key: entry.key(),
            price_raw: result.price.clone(),
            price_value: crate::analyzer::parse_price(&result.price),
            url: result.url.clone(),
            observed_at: Utc::now(),
        };

        let history = history.lock().await;
        match history.previous(&observation.storefront, &observation.catalog_key) {
            Ok(Some(previous)) if previous.price_value != observation.price_value => {
                let lowest = history
                    .lowest(&observation.storefront, &observation.catalog_key)
                    .ok()
                    .flatten()
                    .map(|o| o.price_raw)
                    .unwrap_or_else(|| "-".to_string());
                info!(
                    "[{}] price change for {}: {} -> {} (lowest seen {})",
                    observation.storefront, entry, previous.price_raw, observation.price_raw, lowest
                );
            }
            Ok(_) => {}
            Err(e) => warn!("History lookup failed: {:?}", e),
        }
        if let Err(e) = history.record(&observation) {
            warn!("History save failed: {:?}", e);
        }
    }
}

/// Search text for a row: product line followed by its features.
pub fn search_query(entry: &CatalogEntry) -> String {
    [&entry.product_line, &entry.cpu, &entry.ram, &entry.storage]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn log_trace(storefront: &str, entry: &CatalogEntry, trace: &MatchTrace) {
    for event in &trace.events {
        match event {
            TraceEvent::Excluded { index, token } => {
                debug!("[{}] {}: #{} excluded by '{}'", storefront, entry, index, token)
            }
            TraceEvent::NumericMismatch { index, missing } => {
                debug!("[{}] {}: #{} lacks numbers {:?}", storefront, entry, index, missing)
            }
            TraceEvent::AttributeMiss { index, attribute } => {
                debug!("[{}] {}: #{} misses {}", storefront, entry, index, attribute.as_str())
            }
            TraceEvent::Scored { index, score } => {
                debug!("[{}] {}: #{} scored {}", storefront, entry, index, score)
            }
            TraceEvent::BelowThreshold { index, score, min_score } => {
                debug!("[{}] {}: best #{} scored {} < {}", storefront, entry, index, score, min_score)
            }
            TraceEvent::Selected { index } => debug!("[{}] {}: #{} selected", storefront, entry, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchPolicy;
    use crate::model::{ColorOption, ScraperError};
    use crate::resolver::DEFAULT_FETCH_TIMEOUT;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn parts() -> (Arc<Normalizer>, Arc<SynonymTables>) {
        let normalizer = Arc::new(Normalizer::default());
        let tables = Arc::new(SynonymTables::builtin(&normalizer).unwrap());
        (normalizer, tables)
    }

    fn storefront(policy: MatchPolicy, color: ColorStrategy) -> (StorefrontMatcher, ColorResolver) {
        let (normalizer, tables) = parts();
        let matcher = StorefrontMatcher::new(
            "shop",
            FeatureExtractor::new(normalizer.clone(), tables.clone()),
            CandidateMatcher::new(normalizer.clone(), policy),
            color,
        );
        (matcher, ColorResolver::new(normalizer, tables, DEFAULT_FETCH_TIMEOUT))
    }

    fn entry(color: Option<&str>) -> CatalogEntry {
        CatalogEntry::new("Surface Pro 11", "Ultra 7", "16GB", "512GB", color)
    }

    #[tokio::test]
    async fn test_color_fallthrough_takes_next_attribute_match() {
        let candidates = vec![
            Listing::new("Surface Pro 11 Ultra 7 16GB 512GB", "https://a")
                .with_price("50000000")
                .with_inline_colors(vec![ColorOption::new("مشکی", true)]),
            Listing::new("Surface Pro 11 Ultra 7 16GB 512GB", "https://b")
                .with_price("52000000")
                .with_inline_colors(vec![ColorOption::new("پلاتینی", true)]),
        ];

        let (plain, resolver) = storefront(MatchPolicy::Strict, ColorStrategy::Resolve);
        let resolution = plain.resolve_row(&entry(Some("Platinum")), &candidates, &resolver).await;
        assert!(matches!(resolution.result, Err(MissReason::ColorUnavailable)));

        let fallthrough = plain.with_color_fallthrough(true);
        let resolution = fallthrough.resolve_row(&entry(Some("Platinum")), &candidates, &resolver).await;
        let result = resolution.result.unwrap();
        assert_eq!(result.url, "https://b");
        assert_eq!(result.price, "52000000");
    }

    #[tokio::test]
    async fn test_color_in_title_strategy() {
        let candidates = vec![
            Listing::new("Surface Pro 11 Ultra 7 16/512 Black", "https://black"),
            Listing::new("Surface Pro 11 Ultra 7 16/512 پلاتینیوم", "https://platinum"),
        ];
        let (matcher, resolver) = storefront(MatchPolicy::Strict, ColorStrategy::Title);
        let resolution = matcher.resolve_row(&entry(Some("Platinum")), &candidates, &resolver).await;
        assert_eq!(resolution.result.unwrap().url, "https://platinum");
    }

    #[tokio::test]
    async fn test_ignore_strategy_skips_color() {
        let candidates = vec![Listing::new("Surface Pro 11 Ultra 7 16/512 Black", "https://black")];
        let (matcher, resolver) = storefront(MatchPolicy::Strict, ColorStrategy::Ignore);
        let resolution = matcher.resolve_row(&entry(Some("Platinum")), &candidates, &resolver).await;
        assert!(resolution.result.is_ok());
    }

    #[tokio::test]
    async fn test_trace_explains_attribute_miss() {
        let candidates = vec![Listing::new("Surface Laptop 7 X Elite", "https://laptop")];
        let (matcher, resolver) = storefront(MatchPolicy::Strict, ColorStrategy::Resolve);
        let resolution = matcher.resolve_row(&entry(None), &candidates, &resolver).await;
        assert!(matches!(resolution.result, Err(MissReason::NoAttributeMatch)));
        assert!(!resolution.trace.events.is_empty());
    }

    struct SearchSource {
        calls: AtomicUsize,
        queries: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ProductSource for SearchSource {
        async fn list_candidates(&self, target: &SourceTarget) -> Result<Vec<Listing>, ScraperError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let SourceTarget::Search(q) = target {
                self.queries.lock().unwrap().push(q.clone());
            }
            match call {
                0 => Ok(vec![
                    Listing::new("Surface Pro 11 Ultra 7 16GB 512GB", "https://shop.ir/p/11").with_price("52,000,000"),
                ]),
                1 => Err(ScraperError::Timeout),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn test_search_run_degrades_failures_to_misses() {
        let (matcher, resolver) = storefront(MatchPolicy::Strict, ColorStrategy::Ignore);
        let source = Arc::new(SearchSource {
            calls: AtomicUsize::new(0),
            queries: std::sync::Mutex::new(Vec::new()),
        });
        let runner = StorefrontRunner::new(
            matcher,
            source.clone(),
            SourcePlan::Search,
            resolver,
            StorefrontColumns::new("shop", "shop_price", "shop_url"),
        );

        let entries = vec![
            entry(None),
            CatalogEntry::new("Surface Laptop 7", "X Elite", "32GB", "1TB", None),
            CatalogEntry::new("Surface Pro 10", "Ultra 5", "8GB", "256GB", Some("nan")),
        ];
        let table = Arc::new(Mutex::new(ResultTable::new(entries.clone(), vec![runner.columns().clone()])));
        let summary = runner.run(&entries, table.clone(), None).await;

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.misses.get(&MissReason::SourceFetchFailure), Some(&1));
        assert_eq!(summary.misses.get(&MissReason::NoCandidate), Some(&1));

        let table = table.lock().await;
        assert_eq!(table.cell(0, "shop"), Some(("52,000,000", "https://shop.ir/p/11")));
        assert_eq!(table.cell(1, "shop"), Some(("", "")));
        assert_eq!(
            source.queries.lock().unwrap()[0],
            "Surface Pro 11 Ultra 7 16GB 512GB"
        );
    }

    #[tokio::test]
    async fn test_history_records_matches() {
        let (matcher, resolver) = storefront(MatchPolicy::Strict, ColorStrategy::Ignore);
        let source = Arc::new(SearchSource {
            calls: AtomicUsize::new(0),
            queries: std::sync::Mutex::new(Vec::new()),
        });
        let runner = StorefrontRunner::new(
            matcher,
            source,
            SourcePlan::Search,
            resolver,
            StorefrontColumns::new("shop", "shop_price", "shop_url"),
        );
        let entries = vec![entry(None)];
        let table = Arc::new(Mutex::new(ResultTable::new(entries.clone(), vec![runner.columns().clone()])));
        let history = Arc::new(Mutex::new(PriceHistory::in_memory().unwrap()));

        runner.run(&entries, table, Some(history.clone())).await;

        let stored = history
            .lock()
            .await
            .previous("shop", &entries[0].key())
            .unwrap()
            .unwrap();
        assert_eq!(stored.price_value, Some(52_000_000));
    }

    #[test]
    fn test_search_query_skips_blanks() {
        let e = CatalogEntry::new("Surface Pro 11", "nan", "16GB", " ", None);
        assert_eq!(search_query(&e), "Surface Pro 11 16GB");
    }
}
