use crate::model::{ColorOption, ScraperError};
use crate::parser::ColorExtractor;
use crate::scraper::traits::{ColorProvider, Fetcher};

use std::sync::Arc;
use tracing::debug;

/// Reads color variants from a listing's product page.
pub struct HtmlColorProvider {
    fetcher: Arc<dyn Fetcher>,
    extractor: ColorExtractor,
}

impl HtmlColorProvider {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: ColorExtractor) -> Self {
        Self { fetcher, extractor }
    }
}

#[async_trait::async_trait]
impl ColorProvider for HtmlColorProvider {
    async fn fetch_colors(&self, url: &str) -> Result<Vec<ColorOption>, ScraperError> {
        let html = self.fetcher.fetch(url).await?;
        let options = self.extractor.extract(&html, url)?;
        debug!("{} color options at {}", options.len(), url);
        Ok(options)
    }
}
