use crate::model::CatalogEntry;
use crate::normalizer::{digit_runs, Normalizer, SynonymTable, SynonymTables};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Structured search derived from one catalog row.
///
/// Each `*_terms` set holds every normalized surface form that counts as a hit for
/// that attribute. An empty set means the attribute was absent and must not block
/// a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub name_terms: BTreeSet<String>,
    pub cpu_terms: BTreeSet<String>,
    pub ram_terms: BTreeSet<String>,
    pub storage_terms: BTreeSet<String>,
    pub color_terms: BTreeSet<String>,
    /// Digit runs of the product line, RAM and storage text, with repeats counted.
    pub numeric_tokens: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Name,
    Cpu,
    Ram,
    Storage,
    Color,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::Cpu => "cpu",
            Attribute::Ram => "ram",
            Attribute::Storage => "storage",
            Attribute::Color => "color",
        }
    }
}

impl Query {
    pub fn terms(&self, attribute: Attribute) -> &BTreeSet<String> {
        match attribute {
            Attribute::Name => &self.name_terms,
            Attribute::Cpu => &self.cpu_terms,
            Attribute::Ram => &self.ram_terms,
            Attribute::Storage => &self.storage_terms,
            Attribute::Color => &self.color_terms,
        }
    }
}

/// Turns catalog rows into queries using one storefront's normalizer and tables.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    normalizer: Arc<Normalizer>,
    tables: Arc<SynonymTables>,
}

impl FeatureExtractor {
    pub fn new(normalizer: Arc<Normalizer>, tables: Arc<SynonymTables>) -> Self {
        Self { normalizer, tables }
    }

    pub fn extract_query(&self, entry: &CatalogEntry) -> Query {
        let cpu = rewrite_ultra(&self.normalizer.normalize(&entry.cpu));
        let numeric_source = format!("{} {} {}", entry.product_line, entry.ram, entry.storage);

        Query {
            name_terms: self.expand(&self.normalizer.normalize(&entry.product_line), &self.tables.products),
            cpu_terms: self.expand(&cpu, &self.tables.cpus),
            ram_terms: self.expand(&self.normalizer.normalize(&entry.ram), &self.tables.sizes),
            storage_terms: self.expand(&self.normalizer.normalize(&entry.storage), &self.tables.sizes),
            color_terms: entry
                .desired_color()
                .map(|c| self.expand(&self.normalizer.normalize(c), &self.tables.colors))
                .unwrap_or_default(),
            numeric_tokens: digit_runs(&numeric_source.to_lowercase()),
        }
    }

    /// Raw form, canonical key and every surface form of that key.
    fn expand(&self, normalized: &str, table: &SynonymTable) -> BTreeSet<String> {
        let mut terms = BTreeSet::new();
        if normalized.is_empty() || normalized == "nan" {
            return terms;
        }
        terms.insert(normalized.to_string());
        if let Some(key) = table.canonical(normalized) {
            terms.insert(key.to_string());
            terms.extend(table.normalized_forms(key));
        }
        terms
    }
}

/// Storefronts rarely print a bare "ultra"; they write "core ultra" or "intel ultra".
fn rewrite_ultra(cpu: &str) -> String {
    if cpu.contains("ultra") && !cpu.contains("coreultra") && !cpu.contains("intelultra") {
        cpu.replacen("ultra", "coreultra", 1)
    } else {
        cpu.to_string()
    }
}
