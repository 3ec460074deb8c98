//! Bilingual text normalization.
//!
//! Every comparison in the matcher happens between *fused tokens*: lower-cased,
//! digit-mapped strings with every separator removed, so "X Plus", "x-plus" and
//! "XPlus" all become `xplus`. Persian unit words are rewritten to their English
//! abbreviations before fusing, which makes `۱۶ گیگ` and `16GB` compare equal.

pub mod synonyms;

use crate::model::SynonymError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub use synonyms::{SynonymSpec, SynonymTable, SynonymTables};

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"[0-9]+").unwrap();
}

/// Upper bound on fused-form substitution passes.
const MAX_SUBSTITUTION_PASSES: usize = 16;

/// Unit words shipped with every normalizer, longest first.
const DEFAULT_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("گیگابایت", "gb"),
    ("ترابایت", "tb"),
    ("گیگ", "gb"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Substitution {
    pattern: String,
    fused_pattern: String,
    replacement: String,
}

/// Text normalizer with an ordered set of literal substitutions.
#[derive(Debug, Clone)]
pub struct Normalizer {
    substitutions: Vec<Substitution>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            substitutions: DEFAULT_SUBSTITUTIONS
                .iter()
                .map(|(pattern, replacement)| Substitution::new(pattern, replacement))
                .collect(),
        }
    }
}

impl Substitution {
    fn new(pattern: &str, replacement: &str) -> Self {
        let pattern = map_digits(&pattern.to_lowercase());
        Self {
            fused_pattern: strip_separators(&fold_letters(&pattern)),
            pattern,
            replacement: replacement.to_lowercase(),
        }
    }
}

impl Normalizer {
    /// A normalizer without any substitutions.
    pub fn empty() -> Self {
        Self {
            substitutions: Vec::new(),
        }
    }

    /// Registers extra substitutions. The full set is kept sorted longest pattern
    /// first (ties broken lexically) so overlapping patterns resolve the same way
    /// regardless of registration order.
    pub fn with_substitutions<'a, I>(mut self, pairs: I) -> Result<Self, SynonymError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (pattern, replacement) in pairs {
            let sub = Substitution::new(pattern, replacement);
            if sub.fused_pattern.is_empty() {
                return Err(invalid(&sub.pattern, &sub.replacement, "pattern is empty after normalization"));
            }
            if strip_separators(&sub.replacement) != sub.replacement {
                return Err(invalid(&sub.pattern, &sub.replacement, "replacement must already be a fused token"));
            }
            if self.substitutions.iter().any(|s| s.fused_pattern == sub.fused_pattern) {
                continue;
            }
            self.substitutions.push(sub);
        }

        for s in &self.substitutions {
            if let Some(other) = self
                .substitutions
                .iter()
                .find(|o| s.replacement.contains(&o.fused_pattern))
            {
                return Err(invalid(
                    &s.pattern,
                    &s.replacement,
                    &format!("replacement contains pattern `{}`", other.pattern),
                ));
            }
        }

        self.substitutions.sort_by(|a, b| {
            b.fused_pattern
                .chars()
                .count()
                .cmp(&a.fused_pattern.chars().count())
                .then_with(|| a.fused_pattern.cmp(&b.fused_pattern))
        });
        Ok(self)
    }

    /// Canonical comparison form of `text`.
    pub fn normalize(&self, text: &str) -> String {
        let mut text = map_digits(&text.to_lowercase());
        for s in &self.substitutions {
            if text.contains(&s.pattern) {
                text = text.replace(&s.pattern, &s.replacement);
            }
        }

        let mut fused = strip_separators(&fold_letters(&text));

        // Separators removed above can expose new pattern occurrences.
        for _ in 0..MAX_SUBSTITUTION_PASSES {
            let mut changed = false;
            for s in &self.substitutions {
                if fused.contains(&s.fused_pattern) {
                    fused = fused.replace(&s.fused_pattern, &s.replacement);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        fused
    }

    /// Normalized, non-empty forms of every value.
    pub fn normalize_all<'a, I>(&self, values: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        values
            .into_iter()
            .map(|v| self.normalize(v))
            .filter(|v| !v.is_empty())
            .collect()
    }
}

fn invalid(pattern: &str, replacement: &str, reason: &str) -> SynonymError {
    SynonymError::InvalidSubstitution {
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
        reason: reason.to_string(),
    }
}

/// Maps Persian (U+06F0..) and Arabic-Indic (U+0660..) digits to ASCII.
pub fn map_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            _ => c,
        })
        .collect()
}

/// Folds Arabic letter variants onto their Persian forms and drops harakat and tatweel.
fn fold_letters(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{0640}'))
        .map(|c| match c {
            '\u{064A}' | '\u{0649}' => '\u{06CC}',
            '\u{0643}' => '\u{06A9}',
            _ => c,
        })
        .collect()
}

fn is_kept(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_uppercase() || c.is_ascii_digit() || ('\u{0622}'..='\u{06CC}').contains(&c)
}

fn strip_separators(text: &str) -> String {
    text.chars().filter(|c| is_kept(*c)).collect()
}

/// True when `text` contains Persian/Arabic script.
pub fn is_persian(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Digit runs of `text` after lower-casing and digit mapping, separators intact.
/// Digit runs of `text` with how often each occurs, so "Pro 8 8GB" holds two `8`s.
pub fn digit_runs(text: &str) -> BTreeMap<String, usize> {
    let mapped = map_digits(text);
    let mut runs = BTreeMap::new();
    for m in DIGIT_RUN.find_iter(&mapped) {
        *runs.entry(m.as_str().to_string()).or_insert(0) += 1;
    }
    runs
}
