// Color variant extraction from product pages
use super::listing_parser::{compile, element_text};
use crate::model::{ColorOption, ParserError};
use crate::utils::{clean_price_text, collapse_whitespace, with_query_param};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_form() -> String {
    "form.variations_form".to_string()
}

fn default_attribute() -> String {
    "attribute_pa_color".to_string()
}

fn default_labels() -> Vec<String> {
    vec!["رنگ".to_string(), "color".to_string()]
}

/// How a storefront exposes color variants on its product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColorExtractorConfig {
    /// Swatch elements; availability read from their classes.
    Swatches {
        selector: String,
        #[serde(default)]
        label_selector: Option<String>,
        #[serde(default)]
        enabled_class: Option<String>,
        #[serde(default)]
        disabled_class: Option<String>,
    },
    /// WooCommerce `data-product_variations` JSON.
    VariationsJson {
        #[serde(default = "default_form")]
        form_selector: String,
        #[serde(default = "default_attribute")]
        attribute: String,
    },
    /// A `<select>` whose label mentions color.
    LabeledSelect {
        #[serde(default = "default_labels")]
        labels: Vec<String>,
    },
    /// List items whose input value selects the variant through a query parameter.
    VariantList {
        item_selector: String,
        label_selector: String,
        value_selector: String,
        query_param: String,
    },
    /// A single "color: X" line in the product description.
    DescriptionAttribute { selector: String, prefix: String },
}

enum Extractor {
    Swatches {
        selector: Selector,
        label: Option<Selector>,
        enabled_class: Option<String>,
        disabled_class: Option<String>,
    },
    VariationsJson {
        form: Selector,
        attribute: String,
    },
    LabeledSelect {
        labels: Vec<String>,
    },
    VariantList {
        item: Selector,
        label: Selector,
        value: Selector,
        query_param: String,
    },
    DescriptionAttribute {
        selector: Selector,
        prefix: String,
    },
}

pub struct ColorExtractor {
    inner: Extractor,
}

impl ColorExtractor {
    pub fn new(config: &ColorExtractorConfig) -> Result<Self, ParserError> {
        let inner = match config {
            ColorExtractorConfig::Swatches {
                selector,
                label_selector,
                enabled_class,
                disabled_class,
            } => Extractor::Swatches {
                selector: compile(selector)?,
                label: label_selector.as_deref().map(compile).transpose()?,
                enabled_class: enabled_class.clone(),
                disabled_class: disabled_class.clone(),
            },
            ColorExtractorConfig::VariationsJson { form_selector, attribute } => Extractor::VariationsJson {
                form: compile(form_selector)?,
                attribute: attribute.clone(),
            },
            ColorExtractorConfig::LabeledSelect { labels } => Extractor::LabeledSelect {
                labels: labels.iter().map(|l| l.to_lowercase()).collect(),
            },
            ColorExtractorConfig::VariantList {
                item_selector,
                label_selector,
                value_selector,
                query_param,
            } => Extractor::VariantList {
                item: compile(item_selector)?,
                label: compile(label_selector)?,
                value: compile(value_selector)?,
                query_param: query_param.clone(),
            },
            ColorExtractorConfig::DescriptionAttribute { selector, prefix } => Extractor::DescriptionAttribute {
                selector: compile(selector)?,
                prefix: prefix.clone(),
            },
        };
        Ok(Self { inner })
    }

    /// Color options found on the product page at `page_url`.
    pub fn extract(&self, html: &str, page_url: &str) -> Result<Vec<ColorOption>, ParserError> {
        let document = Html::parse_document(html);
        match &self.inner {
            Extractor::Swatches {
                selector,
                label,
                enabled_class,
                disabled_class,
            } => Ok(document
                .select(selector)
                .filter_map(|swatch| {
                    let name = swatch_label(&swatch, label.as_ref());
                    if name.is_empty() {
                        return None;
                    }
                    let has = |class: &Option<String>| {
                        class
                            .as_deref()
                            .is_some_and(|c| swatch.value().classes().any(|own| own == c))
                    };
                    let enabled = (enabled_class.is_none() || has(enabled_class)) && !has(disabled_class);
                    Some(ColorOption::new(&name, enabled))
                })
                .collect()),
            Extractor::VariationsJson { form, attribute } => {
                let Some(raw) = document
                    .select(form)
                    .next()
                    .and_then(|f| f.value().attr("data-product_variations"))
                else {
                    return Ok(Vec::new());
                };
                parse_variations(raw, attribute)
            }
            Extractor::LabeledSelect { labels } => Ok(labeled_select(&document, labels)),
            Extractor::VariantList {
                item,
                label,
                value,
                query_param,
            } => Ok(document
                .select(item)
                .filter_map(|li| {
                    let name = li.select(label).next().map(|n| element_text(&n))?;
                    let key = li.select(value).next()?.value().attr("value")?.trim().to_string();
                    if name.is_empty() || key.is_empty() {
                        return None;
                    }
                    Some(ColorOption::new(&name, true).with_url(&with_query_param(page_url, query_param, &key)))
                })
                .collect()),
            Extractor::DescriptionAttribute { selector, prefix } => Ok(document
                .select(selector)
                .map(|n| element_text(&n))
                .find_map(|text| {
                    let (_, rest) = text.split_once(prefix.as_str())?;
                    let name = rest.trim();
                    (!name.is_empty()).then(|| ColorOption::new(name, true))
                })
                .into_iter()
                .collect()),
        }
    }
}

fn swatch_label(swatch: &ElementRef, label: Option<&Selector>) -> String {
    let attr = |name: &str| {
        swatch
            .value()
            .attr(name)
            .map(collapse_whitespace)
            .filter(|v| !v.is_empty())
    };
    attr("data-title")
        .or_else(|| attr("title"))
        .or_else(|| label.and_then(|sel| swatch.select(sel).next()).map(|n| element_text(&n)))
        .unwrap_or_else(|| element_text(swatch))
}

fn parse_variations(raw: &str, attribute: &str) -> Result<Vec<ColorOption>, ParserError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParserError::MalformedVariations(e.to_string()))?;
    // WooCommerce writes `false` when variations are loaded lazily.
    let Some(variations) = value.as_array() else {
        return Ok(Vec::new());
    };

    let mut options = Vec::new();
    for variation in variations {
        let Some(label) = variation
            .get("attributes")
            .and_then(|a| a.get(attribute))
            .and_then(Value::as_str)
        else {
            continue;
        };
        let label = urlencoding::decode(label)
            .map(|l| l.into_owned())
            .unwrap_or_else(|_| label.to_string())
            .replace('-', " ");
        if label.trim().is_empty() {
            continue;
        }

        let in_stock = variation.get("is_in_stock").and_then(Value::as_bool).unwrap_or(true);
        let purchasable = variation.get("is_purchasable").and_then(Value::as_bool).unwrap_or(true);
        let mut option = ColorOption::new(label.trim(), in_stock && purchasable);
        if let Some(price) = variation.get("display_price").and_then(price_string) {
            option = option.with_price(&price);
        }
        options.push(option);
    }
    Ok(options)
}

fn price_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(whole), _) => Some(whole.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f >= 0.0 => Some(format!("{}", f as u64)),
            (None, Some(f)) => Some(f.to_string()),
            _ => None,
        },
        Value::String(s) => Some(clean_price_text(s)).filter(|p| !p.is_empty()),
        _ => None,
    }
}

fn labeled_select(document: &Html, labels: &[String]) -> Vec<ColorOption> {
    let (Ok(select_sel), Ok(label_sel), Ok(option_sel)) =
        (Selector::parse("select"), Selector::parse("label"), Selector::parse("option"))
    else {
        return Vec::new();
    };

    let mentions_color = |text: &str| {
        let text = text.to_lowercase();
        labels.iter().any(|l| text.contains(l.as_str()))
    };

    for select in document.select(&select_sel) {
        let by_id = select.value().id().and_then(|id| {
            document
                .select(&label_sel)
                .find(|l| l.value().attr("for") == Some(id))
                .map(|l| element_text(&l))
        });
        let nearby = || {
            select
                .ancestors()
                .take(2)
                .filter_map(ElementRef::wrap)
                .find_map(|a| a.select(&label_sel).next().map(|l| element_text(&l)))
        };
        let label = by_id.or_else(nearby).unwrap_or_default();
        if !mentions_color(&label) {
            continue;
        }

        return select
            .select(&option_sel)
            .filter_map(|option| {
                let name = element_text(&option);
                if name.is_empty() || option.value().attr("value") == Some("") {
                    return None;
                }
                Some(ColorOption::new(&name, option.value().attr("disabled").is_none()))
            })
            .collect();
    }
    Vec::new()
}
