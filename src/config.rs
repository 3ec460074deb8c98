use crate::matcher::MatchPolicy;
use crate::model::ConfigError;
use crate::normalizer::SynonymSpec;
use crate::parser::{
    ColorExtractor, ColorExtractorConfig, JsonListingFields, ListingParser, ListingSelectors, PagePriceParser,
};
use crate::scraper::html_source::Pagination;
use crate::scraper::DEFAULT_USER_AGENT;

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;

fn default_request_delay_ms() -> u64 {
    1500
}

fn default_delay_jitter_ms() -> u64 {
    1000
}

fn default_fetch_timeout_seconds() -> u64 {
    20
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Crawl category pages once and match every row against them.
    Category {
        urls: Vec<String>,
        #[serde(default)]
        pagination: Option<Pagination>,
    },
    /// Query the search endpoint once per row.
    Search { url_pattern: String },
}

/// How a storefront's listings carry color.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ColorConfig {
    /// Color is not compared.
    #[default]
    Ignore,
    /// Color terms must appear in the listing title.
    Title,
    /// Color terms must appear in the percent-decoded listing URL.
    Url,
    /// Color is checked against the listing's variant options.
    Resolve {
        #[serde(default)]
        extractor: Option<ColorExtractorConfig>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorefrontConfig {
    pub name: String,
    pub price_column: String,
    pub url_column: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub source: SourceConfig,
    /// Listing cards in HTML pages.
    #[serde(default)]
    pub selectors: Option<ListingSelectors>,
    /// Listing rows in JSON responses.
    #[serde(default)]
    pub json: Option<JsonListingFields>,
    /// Product page price selectors, used when a matched listing has no price.
    #[serde(default)]
    pub page_price: Vec<String>,
    #[serde(default)]
    pub policy: MatchPolicy,
    #[serde(default = "enabled")]
    pub numeric_guard: bool,
    /// Replaces the built-in accessory words when present.
    #[serde(default)]
    pub exclusions: Option<Vec<String>>,
    #[serde(default)]
    pub color: ColorConfig,
    /// Extra color surface forms used only by this storefront.
    #[serde(default)]
    pub color_synonyms: BTreeMap<String, Vec<String>>,
    /// Extra literal normalizer substitutions.
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
    /// Try the next attribute match when color resolution rejects one.
    #[serde(default)]
    pub color_fallthrough: bool,
    #[serde(default)]
    pub page_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    pub catalog_path: String,
    pub output_path: String,
    #[serde(default)]
    pub history_db: Option<String>,
    #[serde(default)]
    pub synonyms_path: Option<String>,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub verbose: bool,
    pub storefronts: Vec<StorefrontConfig>,
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storefronts.is_empty() {
            return Err(invalid("storefronts", "at least one storefront is required"));
        }
        if self.fetch_timeout_seconds == 0 {
            return Err(invalid("fetch_timeout_seconds", "must be positive"));
        }

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for storefront in &self.storefronts {
            storefront.validate()?;
            if !names.insert(storefront.name.as_str()) {
                return Err(invalid("storefronts.name", format!("duplicate storefront `{}`", storefront.name)));
            }
            for column in [&storefront.price_column, &storefront.url_column] {
                if !columns.insert(column.as_str()) {
                    return Err(invalid(&storefront.name, format!("output column `{}` is used twice", column)));
                }
            }
        }
        Ok(())
    }
}

impl StorefrontConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid("storefronts.name", "must not be empty"));
        }
        if self.price_column.trim().is_empty() || self.url_column.trim().is_empty() {
            return Err(invalid(&self.name, "price_column and url_column must not be empty"));
        }

        match &self.source {
            SourceConfig::Category { urls, pagination } => {
                if urls.is_empty() {
                    return Err(invalid(&self.name, "category source needs at least one url"));
                }
                if let Some(p) = pagination {
                    if !p.template.contains("{page}") {
                        return Err(invalid(&self.name, "pagination template must contain {page}"));
                    }
                    if p.max_pages == 0 {
                        return Err(invalid(&self.name, "pagination max_pages must be positive"));
                    }
                }
            }
            SourceConfig::Search { url_pattern } => {
                if !url_pattern.contains("{query}") {
                    return Err(invalid(&self.name, "search url_pattern must contain {query}"));
                }
            }
        }

        if let MatchPolicy::Scored { min_score, .. } = &self.policy {
            if *min_score == 0 {
                return Err(invalid(&self.name, "min_score must be at least 1"));
            }
        }

        match (&self.selectors, &self.json) {
            (Some(selectors), None) => {
                ListingParser::new(selectors, self.base_url.as_deref())?;
            }
            (None, Some(fields)) => {
                if let Some(pointer) = fields.invalid_pointers().first() {
                    return Err(invalid(&self.name, format!("json field `{}` must start with /", pointer)));
                }
                if !fields.has_url_source() {
                    return Err(invalid(&self.name, "json needs a url field or an id with a {id} url_template"));
                }
            }
            _ => return Err(invalid(&self.name, "exactly one of selectors or json is required")),
        }
        PagePriceParser::new(&self.page_price)?;
        if let ColorConfig::Resolve { extractor: Some(extractor) } = &self.color {
            ColorExtractor::new(extractor)?;
        }
        Ok(())
    }
}

/// Loads and validates the application configuration.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Loads extra synonym rows to merge over the built-in tables.
pub fn load_synonyms(path: &str) -> Result<SynonymSpec, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
