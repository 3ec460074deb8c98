use crate::model::ScraperError;
use crate::parser::PagePriceParser;
use crate::scraper::traits::Fetcher;

use std::sync::Arc;
use tracing::debug;

/// Looks up a listing's price on its own product page, for storefronts whose
/// listing data carries none.
pub struct ProductPagePrice {
    fetcher: Arc<dyn Fetcher>,
    parser: PagePriceParser,
}

impl ProductPagePrice {
    pub fn new(fetcher: Arc<dyn Fetcher>, parser: PagePriceParser) -> Self {
        Self { fetcher, parser }
    }

    pub async fn fetch_price(&self, url: &str) -> Result<Option<String>, ScraperError> {
        let html = self.fetcher.fetch(url).await?;
        let price = self.parser.parse(&html);
        debug!("product page price at {}: {:?}", url, price);
        Ok(price)
    }
}
