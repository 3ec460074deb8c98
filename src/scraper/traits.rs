use crate::model::{ColorOption, Listing, ScraperError};

/// What a listing source should look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    /// A category page URL, crawled across its pagination.
    Category(String),
    /// A free-text query sent to the storefront's search endpoint.
    Search(String),
}

/// Raw page retrieval.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScraperError>;
}

/// Yields the candidate listings of one storefront.
#[async_trait::async_trait]
pub trait ProductSource: Send + Sync {
    async fn list_candidates(&self, target: &SourceTarget) -> Result<Vec<Listing>, ScraperError>;
}

/// Looks up the color variants of a listing page.
#[async_trait::async_trait]
pub trait ColorProvider: Send + Sync {
    async fn fetch_colors(&self, url: &str) -> Result<Vec<ColorOption>, ScraperError>;
}
