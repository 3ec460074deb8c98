use crate::model::ParserError;
use crate::parser::listing_parser::{compile, element_text};
use crate::utils::clean_price_text;
use scraper::{Html, Selector};

/// Reads the price printed on a product page.
pub struct PagePriceParser {
    selectors: Vec<Selector>,
}

impl PagePriceParser {
    /// `selectors` are tried in order; the first non-empty price wins.
    pub fn new(selectors: &[String]) -> Result<Self, ParserError> {
        let selectors = selectors
            .iter()
            .map(|s| compile(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }

    pub fn parse(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        self.selectors
            .iter()
            .filter_map(|selector| document.select(selector).next())
            .map(|node| clean_price_text(&element_text(&node)))
            .find(|p| !p.is_empty())
    }
}
