use crate::normalizer::map_digits;
use std::fmt;

/// Parses a storefront price into whole currency units.
///
/// Currency words and thousands separators are ignored. For a range such as
/// `"45,000,000 – 52,000,000"` the lower bound is used.
pub fn parse_price(raw: &str) -> Option<u64> {
    let text = map_digits(raw);
    let lower = text.split(['–', '—']).next().unwrap_or_default();
    let lower = match lower.split_once(" - ") {
        Some((first, _)) => first,
        None => lower,
    };
    let digits: String = lower
        .chars()
        .take_while(|c| *c != '.' && *c != '/')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|p| *p > 0)
}

/// One storefront's price for a catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub storefront: String,
    pub price: u64,
    pub url: String,
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.price, self.storefront, self.url)
    }
}

/// Offers collected for one catalog row.
#[derive(Debug, Clone, Default)]
pub struct PriceComparison {
    offers: Vec<Offer>,
}

impl PriceComparison {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an offer when `raw_price` parses to a positive amount.
    pub fn add(&mut self, storefront: &str, raw_price: &str, url: &str) -> bool {
        match parse_price(raw_price) {
            Some(price) => {
                self.offers.push(Offer {
                    storefront: storefront.to_string(),
                    price,
                    url: url.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    /// Lowest price; the earliest added storefront wins ties.
    pub fn cheapest(&self) -> Option<&Offer> {
        self.offers
            .iter()
            .reduce(|best, o| if o.price < best.price { o } else { best })
    }

    /// Difference between the most and least expensive offers.
    pub fn spread(&self) -> Option<u64> {
        let min = self.offers.iter().map(|o| o.price).min()?;
        let max = self.offers.iter().map(|o| o.price).max()?;
        Some(max - min)
    }
}
