// Utility functions
use crate::normalizer::map_digits;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

/// Sets up the `tracing` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "price_sniper=debug,info"
    } else {
        "price_sniper=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();
}

/// Collapses runs of whitespace into single spaces and trims.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips currency words and separators from a storefront price, mapping digits to ASCII.
pub fn clean_price_text(raw: &str) -> String {
    let text = map_digits(raw)
        .replace("تومان", "")
        .replace("ریال", "")
        .replace([',', '٬', '،'], "");
    collapse_whitespace(&text)
}

/// Resolves `href` against `base`; absolute links pass through untouched.
pub fn absolutize(href: &str, base: Option<&Url>) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// Appends `key=value` to the query string of `url`.
pub fn with_query_param(url: &str, key: &str, value: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair(key, value);
            parsed.to_string()
        }
        Err(_) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}={}", url, separator, key, value)
        }
    }
}

/// Last non-empty path segment of `url`, percent-decoded, with dashes as spaces.
pub fn url_slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    Some(decoded.replace('-', " "))
}
