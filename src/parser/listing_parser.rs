// Selector-driven parsing of storefront listing cards
use crate::model::{ColorOption, Listing, ParserError};
use crate::utils::{absolutize, clean_price_text, collapse_whitespace, url_slug};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// Where a card's title comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSource {
    /// Text content of the title element.
    #[default]
    Text,
    /// The `title` attribute, falling back to the text content.
    TitleAttr,
    /// The percent-decoded last path segment of the listing URL.
    UrlSlug,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// One listing card.
    pub item: String,
    pub title: String,
    #[serde(default)]
    pub title_source: TitleSource,
    /// Anchor carrying the listing `href`.
    pub link: String,
    /// Price selectors tried in order; the first non-empty text wins.
    #[serde(default)]
    pub price: Vec<String>,
    /// Color swatch labels printed on the card.
    #[serde(default)]
    pub colors: Option<String>,
}

pub struct ListingParser {
    item: Selector,
    title: Selector,
    title_source: TitleSource,
    link: Selector,
    price: Vec<Selector>,
    colors: Option<Selector>,
    base_url: Option<Url>,
}

pub(crate) fn compile(selector: &str) -> Result<Selector, ParserError> {
    Selector::parse(selector).map_err(|_| ParserError::InvalidSelector(selector.to_string()))
}

pub(crate) fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

impl ListingParser {
    pub fn new(selectors: &ListingSelectors, base_url: Option<&str>) -> Result<Self, ParserError> {
        let price = selectors
            .price
            .iter()
            .map(|s| compile(s))
            .collect::<Result<Vec<_>, _>>()?;
        let colors = selectors.colors.as_deref().map(compile).transpose()?;

        Ok(Self {
            item: compile(&selectors.item)?,
            title: compile(&selectors.title)?,
            title_source: selectors.title_source,
            link: compile(&selectors.link)?,
            price,
            colors,
            base_url: base_url.and_then(|u| Url::parse(u).ok()),
        })
    }

    /// Listings found in `html`. Cards without a title or link are skipped.
    pub fn parse(&self, html: &str) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for card in document.select(&self.item) {
            let href = card
                .select(&self.link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| absolutize(href, self.base_url.as_ref()))
                .unwrap_or_default();
            if href.is_empty() {
                continue;
            }

            let title = self.title(&card, &href);
            if title.is_empty() {
                continue;
            }

            let mut listing = Listing::new(&title, &href);
            listing.price = self
                .price
                .iter()
                .filter_map(|selector| card.select(selector).next())
                .map(|node| clean_price_text(&element_text(&node)))
                .find(|p| !p.is_empty());

            if let Some(selector) = &self.colors {
                let colors: Vec<ColorOption> = card
                    .select(selector)
                    .map(|node| element_text(&node))
                    .filter(|label| !label.is_empty())
                    .map(|label| ColorOption::new(&label, true))
                    .collect();
                if !colors.is_empty() {
                    listing = listing.with_inline_colors(colors);
                }
            }

            listings.push(listing);
        }

        listings
    }

    fn title(&self, card: &ElementRef, href: &str) -> String {
        let node = card.select(&self.title).next();
        match self.title_source {
            TitleSource::UrlSlug => url_slug(href).unwrap_or_default(),
            TitleSource::TitleAttr => node
                .map(|n| {
                    n.value()
                        .attr("title")
                        .map(collapse_whitespace)
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| element_text(&n))
                })
                .unwrap_or_default(),
            TitleSource::Text => node.map(|n| element_text(&n)).unwrap_or_default(),
        }
    }
}
