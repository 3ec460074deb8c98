// Bilingual synonym tables: canonical key <-> surface forms
use super::{is_persian, Normalizer};
use crate::model::SynonymError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Persian,
}

/// Raw table data, keyed by canonical value. Loadable from JSON so deployments can
/// extend the built-in vocabulary without a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynonymSpec {
    #[serde(default)]
    pub products: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub cpus: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub sizes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub colors: BTreeMap<String, Vec<String>>,
}

fn entries(rows: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    rows.iter()
        .map(|(key, forms)| (key.to_string(), forms.iter().map(|f| f.to_string()).collect()))
        .collect()
}

impl SynonymSpec {
    pub fn builtin() -> Self {
        Self {
            products: entries(&[
                ("surface pro 11", &["سرفیس پرو 11"]),
                ("surface pro 10", &["سرفیس پرو 10"]),
                ("surface pro 9", &["سرفیس پرو 9"]),
                ("surface pro 8", &["سرفیس پرو 8"]),
                ("surface laptop 7", &["سرفیس لپ تاپ 7", "سرفیس لپتاپ 7"]),
                ("surface laptop 6", &["سرفیس لپ تاپ 6", "سرفیس لپتاپ 6"]),
                ("surface laptop 5", &["سرفیس لپ تاپ 5", "سرفیس لپتاپ 5"]),
            ]),
            cpus: entries(&[
                ("ultra7", &["ultra 7", "core ultra 7", "intel ultra 7", "intel core ultra 7"]),
                ("ultra5", &["ultra 5", "core ultra 5", "intel ultra 5", "intel core ultra 5"]),
                ("i7", &["core i7", "intel core i7"]),
                ("i5", &["core i5", "intel core i5"]),
                ("xplus", &["x plus", "snapdragon x plus", "x-plus"]),
                ("xelite", &["x elite", "snapdragon x elite", "x-elite"]),
            ]),
            sizes: entries(&[
                ("8gb", &["8", "8g", "8 گیگ", "8 گیگابایت"]),
                ("16gb", &["16", "16g", "16 گیگ", "16 گیگابایت"]),
                ("32gb", &["32", "32g", "32 گیگ", "32 گیگابایت"]),
                ("64gb", &["64", "64g", "64 گیگ", "64 گیگابایت"]),
                ("128gb", &["128", "128g", "128 گیگابایت"]),
                ("256gb", &["256", "256g", "256 گیگابایت"]),
                ("512gb", &["512", "512g", "512 گیگابایت"]),
                ("1tb", &["1t", "1 ترابایت", "1 ترا"]),
                ("2tb", &["2t", "2 ترابایت", "2 ترا"]),
            ]),
            colors: entries(&[
                ("platinum", &["پلاتینیوم", "پلاتینی"]),
                ("black", &["مشکی", "graphite", "گرافیت"]),
                ("blue", &["آبی"]),
                ("sapphire", &["آبی (sapphire)", "سفایر"]),
                ("ocean", &["اقیانوسی"]),
                ("purple", &["بنفش"]),
                ("gold", &["طلایی"]),
                ("dune", &["شنی طلایی", "dune gold"]),
                ("silver", &["نقره ای"]),
            ]),
        }
    }

    /// Adds `other`'s surface forms on top of this spec.
    pub fn merge(&mut self, other: SynonymSpec) {
        for (mine, theirs) in [
            (&mut self.products, other.products),
            (&mut self.cpus, other.cpus),
            (&mut self.sizes, other.sizes),
            (&mut self.colors, other.colors),
        ] {
            for (key, forms) in theirs {
                let slot = mine.entry(key).or_default();
                for form in forms {
                    if !slot.contains(&form) {
                        slot.push(form);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct TableEntry {
    /// Raw surface forms, key first.
    surface: Vec<String>,
    normalized: BTreeSet<String>,
}

/// One attribute's mapping. Keys are stored normalized.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    name: String,
    entries: BTreeMap<String, TableEntry>,
    forms: HashMap<String, String>,
}

impl SynonymTable {
    /// Builds the table, rejecting any surface form that normalizes onto two keys.
    pub fn build(
        name: &str,
        rows: &BTreeMap<String, Vec<String>>,
        normalizer: &Normalizer,
    ) -> Result<Self, SynonymError> {
        let mut table = Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
            forms: HashMap::new(),
        };

        for (raw_key, raw_forms) in rows {
            let key = normalizer.normalize(raw_key);
            if key.is_empty() {
                continue;
            }
            let surface: Vec<String> = std::iter::once(raw_key.clone())
                .chain(raw_forms.iter().cloned())
                .collect();

            let entry = table.entries.entry(key.clone()).or_insert_with(|| TableEntry {
                surface: Vec::new(),
                normalized: BTreeSet::new(),
            });
            for form in surface {
                let normalized = normalizer.normalize(&form);
                if normalized.is_empty() {
                    continue;
                }
                if let Some(existing) = table.forms.get(&normalized) {
                    if existing != &key {
                        return Err(SynonymError::Ambiguous {
                            table: table.name.clone(),
                            form,
                            first: existing.clone(),
                            second: key,
                        });
                    }
                }
                table.forms.insert(normalized.clone(), key.clone());
                entry.normalized.insert(normalized);
                if !entry.surface.contains(&form) {
                    entry.surface.push(form);
                }
            }
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical key for an already-normalized token.
    pub fn canonical(&self, normalized: &str) -> Option<&str> {
        self.forms.get(normalized).map(String::as_str)
    }

    /// Canonical key of `value`, or its normalized form when the table does not know it.
    pub fn synonym_match(&self, value: &str, normalizer: &Normalizer) -> String {
        let normalized = normalizer.normalize(value);
        match self.canonical(&normalized) {
            Some(key) => key.to_string(),
            None => normalized,
        }
    }

    /// Every normalized surface form of `key`, the key included.
    pub fn normalized_forms(&self, key: &str) -> BTreeSet<String> {
        self.entries
            .get(key)
            .map(|e| e.normalized.clone())
            .unwrap_or_default()
    }

    /// Representative spelling of `key` in `language`.
    pub fn rendering(&self, key: &str, language: Language) -> Option<&str> {
        let entry = self.entries.get(key)?;
        entry
            .surface
            .iter()
            .find(|form| is_persian(form) == (language == Language::Persian))
            .map(String::as_str)
    }
}

/// The four attribute tables, compiled against one normalizer.
#[derive(Debug, Clone)]
pub struct SynonymTables {
    pub products: SynonymTable,
    pub cpus: SynonymTable,
    pub sizes: SynonymTable,
    pub colors: SynonymTable,
}

impl SynonymTables {
    pub fn build(spec: &SynonymSpec, normalizer: &Normalizer) -> Result<Self, SynonymError> {
        Ok(Self {
            products: SynonymTable::build("product", &spec.products, normalizer)?,
            cpus: SynonymTable::build("cpu", &spec.cpus, normalizer)?,
            sizes: SynonymTable::build("size", &spec.sizes, normalizer)?,
            colors: SynonymTable::build("color", &spec.colors, normalizer)?,
        })
    }

    pub fn builtin(normalizer: &Normalizer) -> Result<Self, SynonymError> {
        Self::build(&SynonymSpec::builtin(), normalizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> (Normalizer, SynonymTables) {
        let n = Normalizer::default();
        let t = SynonymTables::builtin(&n).unwrap();
        (n, t)
    }

    #[test]
    fn test_builtin_tables_are_unambiguous() {
        let (_, t) = tables();
        assert!(!t.products.is_empty());
        assert_eq!(t.cpus.name(), "cpu");
        assert_eq!(t.colors.len(), 9);
    }

    #[test]
    fn test_persian_color_variants_share_key() {
        let (n, t) = tables();
        assert_eq!(t.colors.synonym_match("پلاتینیوم", &n), "platinum");
        assert_eq!(t.colors.synonym_match("پلاتینی", &n), "platinum");
        assert_eq!(t.colors.synonym_match("Platinum", &n), "platinum");
        assert_eq!(t.colors.synonym_match("Graphite", &n), "black");
    }

    #[test]
    fn test_unknown_value_falls_back_to_normalized() {
        let (n, t) = tables();
        assert_eq!(t.colors.synonym_match("Forest Green", &n), "forestgreen");
        assert_eq!(t.cpus.synonym_match("", &n), "");
    }

    #[test]
    fn test_size_synonyms() {
        let (n, t) = tables();
        assert_eq!(t.sizes.synonym_match("16 گیگ", &n), "16gb");
        assert_eq!(t.sizes.synonym_match("۵۱۲ گیگابایت", &n), "512gb");
        assert_eq!(t.sizes.synonym_match("1 ترابایت", &n), "1tb");
        assert_eq!(t.cpus.synonym_match("Snapdragon X Plus", &n), "xplus");
    }

    #[test]
    fn test_rendering_picks_language() {
        let (_, t) = tables();
        assert_eq!(t.products.rendering("surfacepro11", Language::Persian), Some("سرفیس پرو 11"));
        assert_eq!(t.products.rendering("surfacepro11", Language::English), Some("surface pro 11"));
        assert_eq!(t.colors.rendering("platinum", Language::Persian), Some("پلاتینیوم"));
        assert_eq!(t.colors.rendering("missing", Language::Persian), None);
    }

    #[test]
    fn test_ambiguous_form_is_rejected() {
        let n = Normalizer::default();
        let mut spec = SynonymSpec::default();
        spec.colors.insert("blue".into(), vec!["آبی".into()]);
        spec.colors.insert("ocean".into(), vec!["آبی".into()]);
        match SynonymTables::build(&spec, &n) {
            Err(SynonymError::Ambiguous { table, first, second, .. }) => {
                assert_eq!(table, "color");
                assert_eq!(first, "blue");
                assert_eq!(second, "ocean");
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_extends_forms() {
        let n = Normalizer::default();
        let mut spec = SynonymSpec::builtin();
        let mut extra = SynonymSpec::default();
        extra.colors.insert("gold".into(), vec!["گلد".into()]);
        spec.merge(extra);
        let t = SynonymTables::build(&spec, &n).unwrap();
        assert_eq!(t.colors.synonym_match("گلد", &n), "gold");
        assert_eq!(t.colors.synonym_match("طلایی", &n), "gold");
    }
}
