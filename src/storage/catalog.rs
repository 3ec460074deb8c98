// Catalog input and result table output
use crate::analyzer::PriceComparison;
use crate::model::{CatalogEntry, MatchResult, StorageError};

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Reads the catalog CSV. Headers follow `CatalogEntry`'s field names or the
/// spreadsheet aliases ("Product name", "Cpu", "Ram", "SSD", "Color").
pub fn read_catalog(path: impl AsRef<Path>) -> Result<Vec<CatalogEntry>, StorageError> {
    let file = std::fs::File::open(path.as_ref())?;
    let entries = read_catalog_from(file)?;
    info!("Loaded {} catalog rows from {}", entries.len(), path.as_ref().display());
    Ok(entries)
}

pub fn read_catalog_from<R: Read>(reader: R) -> Result<Vec<CatalogEntry>, StorageError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut entries = Vec::new();
    for row in reader.deserialize() {
        let entry: CatalogEntry = row?;
        if entry.product_line.trim().is_empty() {
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Output column names of one storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontColumns {
    pub storefront: String,
    pub price_column: String,
    pub url_column: String,
}

impl StorefrontColumns {
    pub fn new(storefront: &str, price_column: &str, url_column: &str) -> Self {
        Self {
            storefront: storefront.to_string(),
            price_column: price_column.to_string(),
            url_column: url_column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Cell {
    price: String,
    url: String,
}

/// The catalog plus one (price, url) column pair per storefront.
///
/// Rows that were never resolved, for example after a cancelled run, are written
/// with empty cells.
#[derive(Debug, Clone)]
pub struct ResultTable {
    entries: Vec<CatalogEntry>,
    columns: Vec<StorefrontColumns>,
    cells: HashMap<(usize, String), Cell>,
}

impl ResultTable {
    pub fn new(entries: Vec<CatalogEntry>, columns: Vec<StorefrontColumns>) -> Self {
        Self {
            entries,
            columns,
            cells: HashMap::new(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Stores the outcome of `row` for `storefront`; a miss clears the cell.
    pub fn record(&mut self, row: usize, storefront: &str, result: Option<&MatchResult>) {
        let cell = match result {
            Some(r) => Cell {
                price: r.price.clone(),
                url: r.url.clone(),
            },
            None => Cell::default(),
        };
        self.cells.insert((row, storefront.to_string()), cell);
    }

    /// Price and URL recorded for `row` at `storefront`.
    pub fn cell(&self, row: usize, storefront: &str) -> Option<(&str, &str)> {
        self.cells
            .get(&(row, storefront.to_string()))
            .map(|c| (c.price.as_str(), c.url.as_str()))
    }

    /// Number of rows with a non-empty price at `storefront`.
    pub fn matched(&self, storefront: &str) -> usize {
        self.cells
            .iter()
            .filter(|((_, s), c)| s == storefront && !c.price.is_empty())
            .count()
    }

    /// Offers of every storefront for `row`, in column order.
    pub fn comparison(&self, row: usize) -> PriceComparison {
        let mut comparison = PriceComparison::new();
        for column in &self.columns {
            if let Some((price, url)) = self.cell(row, &column.storefront) {
                comparison.add(&column.storefront, price, url);
            }
        }
        comparison
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_to(file)?;
        info!("Wrote {} rows to {}", self.entries.len(), path.as_ref().display());
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), StorageError> {
        let mut writer = csv::Writer::from_writer(writer);

        let mut header = vec!["Product name", "Cpu", "Ram", "SSD", "Color"];
        for column in &self.columns {
            header.push(&column.price_column);
            header.push(&column.url_column);
        }
        header.extend(["best_price", "best_store"]);
        writer.write_record(&header)?;

        for (row, entry) in self.entries.iter().enumerate() {
            let mut record = vec![
                entry.product_line.clone(),
                entry.cpu.clone(),
                entry.ram.clone(),
                entry.storage.clone(),
                entry.desired_color().unwrap_or_default().to_string(),
            ];
            for column in &self.columns {
                let (price, url) = self.cell(row, &column.storefront).unwrap_or(("", ""));
                record.push(price.to_string());
                record.push(url.to_string());
            }
            match self.comparison(row).cheapest() {
                Some(best) => {
                    record.push(best.price.to_string());
                    record.push(best.storefront.clone());
                }
                None => record.extend([String::new(), String::new()]),
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}
