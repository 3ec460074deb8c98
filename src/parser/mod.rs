// HTML and JSON parsing for storefront pages

pub mod color_parser;
pub mod json_parser;
pub mod listing_parser;
pub mod page_price;

pub use color_parser::{ColorExtractor, ColorExtractorConfig};
pub use json_parser::{JsonListingFields, JsonListingParser};
pub use listing_parser::{ListingParser, ListingSelectors, TitleSource};
pub use page_price::PagePriceParser;
