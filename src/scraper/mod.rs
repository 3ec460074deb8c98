// Storefront collaborators: page fetching, listing sources, color providers

pub mod fetcher;
pub mod html_colors;
pub mod html_source;
pub mod json_source;
pub mod page_price;
pub mod traits;

pub use fetcher::{HttpFetcher, DEFAULT_USER_AGENT};
pub use html_colors::HtmlColorProvider;
pub use html_source::HtmlProductSource;
pub use json_source::JsonProductSource;
pub use page_price::ProductPagePrice;
pub use traits::{ColorProvider, Fetcher, ProductSource, SourceTarget};
