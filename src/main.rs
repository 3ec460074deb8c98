use price_sniper::config::{load_config, load_synonyms, AppConfig};
use price_sniper::normalizer::SynonymSpec;
use price_sniper::pipeline::{RunSummary, StorefrontRunner};
use price_sniper::scraper::{Fetcher, HttpFetcher};
use price_sniper::storage::{read_catalog, PriceHistory, ResultTable};
use price_sniper::utils::init_logging;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());

    // Load configuration from file
    let config: AppConfig = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging(false);
            error!("Config load error ({}): {}", config_path, e);
            return;
        }
    };
    init_logging(config.verbose);

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    let mut synonyms = SynonymSpec::builtin();
    if let Some(path) = &config.synonyms_path {
        match load_synonyms(path) {
            Ok(extra) => synonyms.merge(extra),
            Err(e) => {
                error!("Synonym file error ({}): {}", path, e);
                return;
            }
        }
    }

    let entries = match read_catalog(&config.catalog_path) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Catalog load error: {}", e);
            return;
        }
    };

    let fetcher: Arc<dyn Fetcher> = match HttpFetcher::new(
        &config.user_agent,
        Duration::from_secs(config.fetch_timeout_seconds),
    ) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            error!("HTTP client error: {}", e);
            return;
        }
    };

    // Initialize price history (SQLite) with async access (wrapped in a Mutex)
    let history = match &config.history_db {
        Some(path) => match PriceHistory::new(path) {
            Ok(h) => Some(Arc::new(Mutex::new(h))),
            Err(e) => {
                warn!("Price history disabled: {:?}", e);
                None
            }
        },
        None => None,
    };

    let mut runners = Vec::new();
    for storefront in &config.storefronts {
        match StorefrontRunner::from_config(storefront, &config, &synonyms, fetcher.clone()) {
            Ok(runner) => runners.push(runner),
            Err(e) => {
                error!("Storefront {} setup failed: {}", storefront.name, e);
                return;
            }
        }
    }

    let columns = runners.iter().map(|r| r.columns().clone()).collect();
    let table = Arc::new(Mutex::new(ResultTable::new(entries.clone(), columns)));

    info!("Matching {} rows across {} storefronts", entries.len(), runners.len());

    // Process all storefronts concurrently; Ctrl-C keeps the rows finished so far.
    let tasks: Vec<_> = runners
        .iter()
        .map(|runner| runner.run(&entries, table.clone(), history.clone()))
        .collect();
    tokio::select! {
        summaries = join_all(tasks) => log_summaries(&summaries),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, writing finished rows");
        }
    }

    let table = table.lock().await;
    if let Err(e) = table.write_csv(&config.output_path) {
        error!("Failed to write {}: {}", config.output_path, e);
        return;
    }

    for runner in &runners {
        let storefront = &runner.columns().storefront;
        info!("{}: {} of {} rows priced", storefront, table.matched(storefront), entries.len());
    }
    for (row, entry) in table.entries().iter().enumerate() {
        let comparison = table.comparison(row);
        if let Some(best) = comparison.cheapest() {
            match comparison.spread().filter(|s| *s > 0) {
                Some(spread) => info!("💰 {} -> {} (spread {})", entry, best, spread),
                None => info!("💰 {} -> {}", entry, best),
            }
        }
    }
}

fn log_summaries(summaries: &[RunSummary]) {
    for summary in summaries {
        info!(
            "{}: {} matched, misses {:?}",
            summary.storefront, summary.matched, summary.misses
        );
    }
}
