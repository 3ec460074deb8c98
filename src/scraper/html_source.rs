use crate::model::{Listing, ScraperError};
use crate::parser::ListingParser;
use crate::scraper::traits::{ColorProvider, Fetcher, ProductSource, SourceTarget};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

fn default_max_pages() -> u32 {
    10
}

/// Category pagination. `template` receives `{url}` (the category URL) and `{page}`;
/// page 1 is always the plain category URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub template: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Pagination {
    pub fn page_url(&self, url: &str, page: u32) -> String {
        if page <= 1 {
            return url.to_string();
        }
        self.template
            .replace("{url}", url)
            .replace("{page}", &page.to_string())
    }
}

/// A storefront whose listings are read from server-rendered HTML.
pub struct HtmlProductSource {
    name: String,
    fetcher: Arc<dyn Fetcher>,
    parser: ListingParser,
    pagination: Option<Pagination>,
    search_pattern: Option<String>,
    colors: Option<Arc<dyn ColorProvider>>,
    page_delay: Duration,
}

impl HtmlProductSource {
    pub fn new(name: &str, fetcher: Arc<dyn Fetcher>, parser: ListingParser) -> Self {
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

    /// Attached as deferred color data to listings whose card shows no colors.
    pub fn with_color_provider(mut self, provider: Arc<dyn ColorProvider>) -> Self {
        self.colors = Some(provider);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    async fn crawl(&self, url: &str, max_pages: u32) -> Result<Vec<Listing>, ScraperError> {
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

            let html = match self.fetcher.fetch(&page_url).await {
                Ok(html) => html,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    // Most storefronts answer 404 past the last page.
                    debug!("[{}] stopping at page {}: {}", self.name, page, e);
                    break;
                }
            };

            let fresh: Vec<Listing> = self
                .parser
                .parse(&html)
                .into_iter()
                .filter(|l| seen.insert(l.url.clone()))
                .collect();
            if fresh.is_empty() {
                debug!("[{}] page {} has no new listings", self.name, page);
                break;
            }
            listings.extend(fresh);
        }

        Ok(listings)
    }

    fn attach_colors(&self, listings: Vec<Listing>) -> Vec<Listing> {
        match &self.colors {
            Some(provider) => listings
                .into_iter()
                .map(|l| match l.color_info {
                    Some(_) => l,
                    None => l.with_deferred_colors(provider.clone()),
                })
                .collect(),
            None => listings,
        }
    }
}

#[async_trait::async_trait]
impl ProductSource for HtmlProductSource {
    async fn list_candidates(&self, target: &SourceTarget) -> Result<Vec<Listing>, ScraperError> {
        let listings = match target {
            SourceTarget::Category(url) => {
                let max_pages = self.pagination.as_ref().map_or(1, |p| p.max_pages);
                self.crawl(url, max_pages).await?
            }
            SourceTarget::Search(query) => {
                let Some(pattern) = &self.search_pattern else {
                    warn!("[{}] search requested but no search pattern configured", self.name);
                    return Err(ScraperError::Unsupported(format!("{} has no search endpoint", self.name)));
                };
                let url = pattern.replace("{query}", &urlencoding::encode(query));
                self.crawl(&url, 1).await?
            }
        };

        info!("[{}] {} candidate listings", self.name, listings.len());
        Ok(self.attach_colors(listings))
    }
}
