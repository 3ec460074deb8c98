// Listings read from storefront JSON endpoints
use crate::model::{Listing, ParserError};
use crate::utils::{absolutize, clean_price_text, collapse_whitespace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

fn default_rows() -> String {
    "/rows".to_string()
}

/// Where listing data sits in a JSON payload. Every field is a JSON pointer;
/// `rows` is absolute, the others are relative to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonListingFields {
    #[serde(default = "default_rows")]
    pub rows: String,
    pub title: String,
    /// Row field holding the listing URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Row field substituted for `{id}` in `url_template`.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url_template: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

impl JsonListingFields {
    /// Field pointers that are neither empty nor start with `/`.
    pub fn invalid_pointers(&self) -> Vec<&str> {
        [
            Some(&self.rows),
            Some(&self.title),
            self.url.as_ref(),
            self.id.as_ref(),
            self.price.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty() && !p.starts_with('/'))
        .map(String::as_str)
        .collect()
    }

    /// True when rows can be turned into listing URLs.
    pub fn has_url_source(&self) -> bool {
        self.url.is_some()
            || (self.id.is_some() && self.url_template.as_deref().is_some_and(|t| t.contains("{id}")))
    }
}

pub struct JsonListingParser {
    fields: JsonListingFields,
    base_url: Option<Url>,
}

/// Strings and numbers as text; anything else is absent.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

impl JsonListingParser {
    pub fn new(fields: &JsonListingFields, base_url: Option<&str>) -> Self {
        Self {
            fields: fields.clone(),
            base_url: base_url.and_then(|u| Url::parse(u).ok()),
        }
    }

    /// Listings in `body`. Rows without a title or URL are skipped.
    pub fn parse(&self, body: &str) -> Result<Vec<Listing>, ParserError> {
        let payload: Value =
            serde_json::from_str(body).map_err(|e| ParserError::MalformedJson(e.to_string()))?;
        let rows = match payload.pointer(&self.fields.rows) {
            Some(Value::Array(rows)) => rows,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => return Err(ParserError::MalformedJson(format!("`{}` is not an array", self.fields.rows))),
        };

        Ok(rows.iter().filter_map(|row| self.listing(row)).collect())
    }

    fn field(&self, row: &Value, pointer: Option<&String>) -> Option<String> {
        pointer.and_then(|p| row.pointer(p)).and_then(scalar_text)
    }

    fn listing(&self, row: &Value) -> Option<Listing> {
        let title = self.field(row, Some(&self.fields.title))?;
        let url = match self.field(row, self.fields.url.as_ref()) {
            Some(href) => absolutize(&href, self.base_url.as_ref()),
            None => {
                let id = self.field(row, self.fields.id.as_ref())?;
                let template = self.fields.url_template.as_deref()?;
                absolutize(&template.replace("{id}", &id), self.base_url.as_ref())
            }
        };

        let mut listing = Listing::new(&title, &url);
        listing.price = self
            .field(row, self.fields.price.as_ref())
            .map(|p| clean_price_text(&p))
            .filter(|p| !p.is_empty());
        Some(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> JsonListingFields {
        JsonListingFields {
            rows: "/rows".into(),
            title: "/productname".into(),
            url: None,
            id: Some("/_id".into()),
            url_template: Some("/p/{id}".into()),
            price: None,
        }
    }

    #[test]
    fn test_rows_become_listings() {
        let body = r#"{"rows": [
            {"_id": "65a1f0", "productname": "Surface Pro 11  Ultra 7 16GB 512GB"},
            {"_id": 42, "productname": "Surface Laptop 7"},
            {"_id": "65a1f2"},
            {"productname": "No id"}
        ]}"#;
        let parser = JsonListingParser::new(&fields(), Some("https://surfaceiran.com/"));
        let listings = parser.parse(body).unwrap();

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "Surface Pro 11 Ultra 7 16GB 512GB");
        assert_eq!(listings[0].url, "https://surfaceiran.com/p/65a1f0");
        assert_eq!(listings[1].url, "https://surfaceiran.com/p/42");
        assert!(listings[0].price.is_none());
    }

    #[test]
    fn test_url_and_price_fields() {
        let mut f = fields();
        f.rows = "/data/items".into();
        f.url = Some("/link".into());
        f.price = Some("/price/amount".into());
        let body = r#"{"data": {"items": [
            {"productname": "Surface Pro 11", "link": "https://shop.ir/p/11", "price": {"amount": "۵۲,۰۰۰,۰۰۰"}}
        ]}}"#;
        let listings = JsonListingParser::new(&f, None).parse(body).unwrap();
        assert_eq!(listings[0].url, "https://shop.ir/p/11");
        assert_eq!(listings[0].price.as_deref(), Some("52000000"));
    }

    #[test]
    fn test_missing_rows_is_empty() {
        let parser = JsonListingParser::new(&fields(), None);
        assert!(parser.parse(r#"{"total": 0}"#).unwrap().is_empty());
        assert!(parser.parse(r#"{"rows": null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_bad_payloads() {
        let parser = JsonListingParser::new(&fields(), None);
        assert!(matches!(parser.parse("<html>"), Err(ParserError::MalformedJson(_))));
        assert!(matches!(parser.parse(r#"{"rows": {}}"#), Err(ParserError::MalformedJson(_))));
    }

    #[test]
    fn test_field_checks() {
        assert!(fields().has_url_source());
        assert!(fields().invalid_pointers().is_empty());

        let mut f = fields();
        f.url_template = Some("/p/".into());
        assert!(!f.has_url_source());
        f.title = "productname".into();
        assert_eq!(f.invalid_pointers(), vec!["productname"]);
    }
}
