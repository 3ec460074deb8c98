use crate::model::{Listing, ScraperError};
use crate::parser::JsonListingParser;
use crate::scraper::html_source::Pagination;
use crate::scraper::traits::{ColorProvider, Fetcher, ProductSource, SourceTarget};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A storefront whose listings come from a JSON endpoint.
pub struct JsonProductSource {
    name: String,
    fetcher: Arc<dyn Fetcher>,
    parser: JsonListingParser,
    pagination: Option<Pagination>,
    search_pattern: Option<String>,
    colors: Option<Arc<dyn ColorProvider>>,
    page_delay: Duration,
}

impl JsonProductSource {
    pub fn new(name: &str, fetcher: Arc<dyn Fetcher>, parser: JsonListingParser) -> Self {
        Self {
            name: name.to_string(),
            fetcher,
            parser,
            pagination: None,
            search_pattern: None,
            colors: None,
            page_delay: Duration::ZERO,
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Search endpoint; `{query}` is replaced by the percent-encoded query.
    pub fn with_search_pattern(mut self, pattern: &str) -> Self {
        self.search_pattern = Some(pattern.to_string());
        self
    }

    pub fn with_color_provider(mut self, provider: Arc<dyn ColorProvider>) -> Self {
        self.colors = Some(provider);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    async fn pages(&self, url: &str, max_pages: u32) -> Result<Vec<Listing>, ScraperError> {
        let mut listings = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=max_pages.max(1) {
            let page_url = match &self.pagination {
                Some(p) => p.page_url(url, page),
                None => url.to_string(),
            };
            if page > 1 && !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }

            let rows = match self.fetcher.fetch(&page_url).await {
                Ok(body) => match self.parser.parse(&body) {
                    Ok(rows) => rows,
                    Err(e) if page == 1 => return Err(e.into()),
                    Err(e) => {
                        debug!("[{}] unreadable page {}: {}", self.name, page, e);
                        break;
                    }
                },
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    debug!("[{}] stopping at page {}: {}", self.name, page, e);
                    break;
                }
            };

            let fresh: Vec<Listing> = rows.into_iter().filter(|l| seen.insert(l.url.clone())).collect();
            if fresh.is_empty() {
                break;
            }
            listings.extend(fresh);
        }

        Ok(listings)
    }
}

#[async_trait::async_trait]
impl ProductSource for JsonProductSource {
    async fn list_candidates(&self, target: &SourceTarget) -> Result<Vec<Listing>, ScraperError> {
        let listings = match target {
            SourceTarget::Category(url) => {
                let max_pages = self.pagination.as_ref().map_or(1, |p| p.max_pages);
                self.pages(url, max_pages).await?
            }
            SourceTarget::Search(query) => {
                let Some(pattern) = &self.search_pattern else {
                    warn!("[{}] search requested but no search pattern configured", self.name);
                    return Err(ScraperError::Unsupported(format!("{} has no search endpoint", self.name)));
                };
                self.pages(&pattern.replace("{query}", &urlencoding::encode(query)), 1)
                    .await?
            }
        };

        info!("[{}] {} candidate rows", self.name, listings.len());
        Ok(match &self.colors {
            Some(provider) => listings
                .into_iter()
                .map(|l| l.with_deferred_colors(provider.clone()))
                .collect(),
            None => listings,
        })
    }
}
