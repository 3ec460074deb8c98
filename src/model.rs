// Core records: CatalogEntry, Listing, ColorInfo, MatchResult, and the error enums
use crate::scraper::ColorProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One row of the catalog being priced. Never mutated by the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(alias = "Product name")]
    pub product_line: String,
    #[serde(alias = "Cpu", default)]
    pub cpu: String,
    #[serde(alias = "Ram", default)]
    pub ram: String,
    #[serde(alias = "SSD", default)]
    pub storage: String,
    #[serde(alias = "Color", default)]
    pub color: Option<String>,
}

impl CatalogEntry {
    pub fn new(product_line: &str, cpu: &str, ram: &str, storage: &str, color: Option<&str>) -> Self {
        Self {
            product_line: product_line.to_string(),
            cpu: cpu.to_string(),
            ram: ram.to_string(),
            storage: storage.to_string(),
            color: color.map(str::to_string),
        }
    }

    /// Color with blanks and spreadsheet `nan` cells treated as absent.
    pub fn desired_color(&self) -> Option<&str> {
        self.color
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("nan"))
    }

    /// Stable key used by the price history table.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.product_line.trim(),
            self.cpu.trim(),
            self.ram.trim(),
            self.storage.trim(),
            self.desired_color().unwrap_or("")
        )
        .to_lowercase()
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {} | {}",
            self.product_line,
            self.cpu,
            self.ram,
            self.storage,
            self.desired_color().unwrap_or("-")
        )
    }
}

/// A color variant as exposed by a storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorOption {
    pub label: String,
    /// `false` when the storefront marks the option as disabled or out of stock.
    pub enabled: bool,
    /// Variant-specific price, when the storefront publishes one.
    pub price: Option<String>,
    /// Variant-specific URL, when selecting the color changes the address.
    pub url: Option<String>,
}

impl ColorOption {
    pub fn new(label: &str, enabled: bool) -> Self {
        Self {
            label: label.to_string(),
            enabled,
            price: None,
            url: None,
        }
    }

    pub fn with_price(mut self, price: &str) -> Self {
        self.price = Some(price.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

/// Where a listing's color data comes from.
#[derive(Clone)]
pub enum ColorInfo {
    /// Colors printed on the listing card itself.
    Inline(Vec<ColorOption>),
    /// Colors that need a follow-up fetch of the listing page.
    Deferred(Arc<dyn ColorProvider>),
}

impl fmt::Debug for ColorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorInfo::Inline(options) => f.debug_tuple("Inline").field(options).finish(),
            ColorInfo::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub title: String,
    pub url: String,
    pub price: Option<String>,
    pub color_info: Option<ColorInfo>,
}

impl Listing {
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            price: None,
            color_info: None,
        }
    }

    pub fn with_price(mut self, price: &str) -> Self {
        self.price = Some(price.to_string());
        self
    }

    pub fn with_inline_colors(mut self, colors: Vec<ColorOption>) -> Self {
        self.color_info = Some(ColorInfo::Inline(colors));
        self
    }

    pub fn with_deferred_colors(mut self, provider: Arc<dyn ColorProvider>) -> Self {
        self.color_info = Some(ColorInfo::Deferred(provider));
        self
    }
}

/// Terminal output of one catalog row against one storefront.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub listing: Listing,
    pub price: String,
    pub url: String,
}

/// Why a row ended up without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Error)]
pub enum MissReason {
    #[error("storefront returned no listings")]
    NoCandidate,
    #[error("no listing matched the requested attributes")]
    NoAttributeMatch,
    #[error("requested color is not available")]
    ColorUnavailable,
    #[error("listing source failed")]
    SourceFetchFailure,
}

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected response status {0}")]
    InvalidResponse(u16),
    #[error("parse error: {0}")]
    Parse(#[from] ParserError),
    #[error("unsupported target: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for ScraperError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScraperError::Timeout
        } else {
            ScraperError::HttpError(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
    #[error("malformed variation data: {0}")]
    MalformedVariations(String),
    #[error("malformed listing payload: {0}")]
    MalformedJson(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum SynonymError {
    #[error("surface form `{form}` in {table} table maps to both `{first}` and `{second}`")]
    Ambiguous {
        table: String,
        form: String,
        first: String,
        second: String,
    },
    #[error("substitution `{pattern}` -> `{replacement}` is invalid: {reason}")]
    InvalidSubstitution {
        pattern: String,
        replacement: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: String, reason: String },
    #[error(transparent)]
    Synonyms(#[from] SynonymError),
    #[error(transparent)]
    Selector(#[from] ParserError),
}
