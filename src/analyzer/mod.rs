// Analyzer module: price parsing and cross-storefront comparison.

pub mod price_comparison;

pub use price_comparison::{parse_price, Offer, PriceComparison};
