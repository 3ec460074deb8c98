//! Candidate selection.
//!
//! The matcher is pure: it reads the query and the candidate list and returns the
//! chosen listing together with a [`MatchTrace`] describing why each candidate was
//! kept or dropped. Callers decide whether and how to log the trace.

pub mod policy;
pub mod query;

use crate::model::Listing;
use crate::normalizer::{digit_runs, Normalizer};
use std::sync::Arc;

pub use policy::{CandidateText, ColorTarget, MatchPolicy, ScoreWeights};
pub use query::{Attribute, FeatureExtractor, Query};

/// Accessory words; listings containing them are never the device itself.
/// Matched against fused titles, so a bare "pen" would also drop "Open Box".
pub const DEFAULT_EXCLUSIONS: &[&str] = &["keyboard", "surface pen", "slim pen", "کیبورد", "قلم"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Excluded { index: usize, token: String },
    NumericMismatch { index: usize, missing: Vec<String> },
    AttributeMiss { index: usize, attribute: Attribute },
    Scored { index: usize, score: u32 },
    BelowThreshold { index: usize, score: u32, min_score: u32 },
    Selected { index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTrace {
    pub events: Vec<TraceEvent>,
}

impl MatchTrace {
    fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    /// Indices of every candidate the matcher looked at past the screening step.
    pub fn examined(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::AttributeMiss { index, .. } | TraceEvent::Scored { index, .. } => Some(*index),
                TraceEvent::Selected { index } => Some(*index),
                _ => None,
            })
            .fold(Vec::new(), |mut acc, i| {
                if !acc.contains(&i) {
                    acc.push(i);
                }
                acc
            })
    }
}

/// A chosen candidate. `index` is its position in the input slice.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub index: usize,
    pub listing: &'a Listing,
    pub score: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CandidateMatcher {
    normalizer: Arc<Normalizer>,
    policy: MatchPolicy,
    exclusions: Vec<String>,
    numeric_guard: bool,
    color_target: Option<ColorTarget>,
}

impl CandidateMatcher {
    pub fn new(normalizer: Arc<Normalizer>, policy: MatchPolicy) -> Self {
        let exclusions = normalizer
            .normalize_all(DEFAULT_EXCLUSIONS.iter().copied())
            .into_iter()
            .collect();
        Self {
            normalizer,
            policy,
            exclusions,
            numeric_guard: true,
            color_target: None,
        }
    }

    /// Replaces the accessory exclusion list.
    pub fn with_exclusions<'a, I>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.exclusions = self.normalizer.normalize_all(tokens).into_iter().collect();
        self
    }

    pub fn with_numeric_guard(mut self, enabled: bool) -> Self {
        self.numeric_guard = enabled;
        self
    }

    /// Checks color terms during attribute matching. `None` leaves color to the resolver.
    pub fn with_color_target(mut self, target: Option<ColorTarget>) -> Self {
        self.color_target = target;
        self
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Picks at most one candidate. Input order is authoritative for ties.
    pub fn select<'a>(&self, query: &Query, candidates: &'a [Listing]) -> (Option<Selection<'a>>, MatchTrace) {
        let mut trace = MatchTrace::default();
        let selection = match &self.policy {
            MatchPolicy::Strict => self.select_strict(query, candidates, &mut trace),
            MatchPolicy::Scored { min_score, weights } => {
                self.select_scored(query, candidates, *min_score, weights, &mut trace)
            }
        };
        (selection, trace)
    }

    /// Every acceptable candidate, best first: input order for the strict policy,
    /// descending score (earliest first on ties) for the scored policy.
    pub fn ranked<'a>(&self, query: &Query, candidates: &'a [Listing]) -> (Vec<Selection<'a>>, MatchTrace) {
        let mut trace = MatchTrace::default();
        let mut accepted = Vec::new();

        for (index, listing) in candidates.iter().enumerate() {
            let Some(text) = self.screen(index, listing, query, &mut trace) else {
                continue;
            };
            match &self.policy {
                MatchPolicy::Strict => match policy::missing_attribute(query, &text, self.color_target) {
                    Some(attribute) => trace.push(TraceEvent::AttributeMiss { index, attribute }),
                    None => accepted.push(Selection { index, listing, score: None }),
                },
                MatchPolicy::Scored { min_score, weights } => {
                    let score = policy::score(query, &text, weights, self.color_target);
                    trace.push(TraceEvent::Scored { index, score });
                    if score >= *min_score {
                        accepted.push(Selection { index, listing, score: Some(score) });
                    } else {
                        trace.push(TraceEvent::BelowThreshold { index, score, min_score: *min_score });
                    }
                }
            }
        }

        // sort_by is stable, so equal scores keep input order
        accepted.sort_by(|a, b| b.score.cmp(&a.score));
        for s in &accepted {
            trace.push(TraceEvent::Selected { index: s.index });
        }
        (accepted, trace)
    }

    fn select_strict<'a>(
        &self,
        query: &Query,
        candidates: &'a [Listing],
        trace: &mut MatchTrace,
    ) -> Option<Selection<'a>> {
        for (index, listing) in candidates.iter().enumerate() {
            let Some(text) = self.screen(index, listing, query, trace) else {
                continue;
            };
            match policy::missing_attribute(query, &text, self.color_target) {
                Some(attribute) => trace.push(TraceEvent::AttributeMiss { index, attribute }),
                None => {
                    trace.push(TraceEvent::Selected { index });
                    return Some(Selection { index, listing, score: None });
                }
            }
        }
        None
    }

    fn select_scored<'a>(
        &self,
        query: &Query,
        candidates: &'a [Listing],
        min_score: u32,
        weights: &ScoreWeights,
        trace: &mut MatchTrace,
    ) -> Option<Selection<'a>> {
        let mut best: Option<(usize, u32)> = None;

        for (index, listing) in candidates.iter().enumerate() {
            let Some(text) = self.screen(index, listing, query, trace) else {
                continue;
            };
            let score = policy::score(query, &text, weights, self.color_target);
            trace.push(TraceEvent::Scored { index, score });
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        let (index, score) = best?;
        if score < min_score {
            trace.push(TraceEvent::BelowThreshold { index, score, min_score });
            return None;
        }
        trace.push(TraceEvent::Selected { index });
        Some(Selection {
            index,
            listing: &candidates[index],
            score: Some(score),
        })
    }

    /// Normalizes a candidate and applies the accessory and numeric guards.
    fn screen(&self, index: usize, listing: &Listing, query: &Query, trace: &mut MatchTrace) -> Option<CandidateText> {
        let title = self.normalizer.normalize(&listing.title);

        if let Some(token) = self.exclusions.iter().find(|t| title.contains(t.as_str())) {
            trace.push(TraceEvent::Excluded { index, token: token.clone() });
            return None;
        }

        if self.numeric_guard && !query.numeric_tokens.is_empty() {
            let runs = digit_runs(&listing.title.to_lowercase());
            let missing: Vec<String> = query
                .numeric_tokens
                .iter()
                .filter(|(run, wanted)| runs.get(run.as_str()).copied().unwrap_or(0) < **wanted)
                .map(|(run, _)| run.clone())
                .collect();
            if !missing.is_empty() {
                trace.push(TraceEvent::NumericMismatch { index, missing });
                return None;
            }
        }

        let url = match self.color_target {
            Some(ColorTarget::Url) => {
                let decoded = urlencoding::decode(&listing.url)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| listing.url.clone());
                self.normalizer.normalize(&decoded)
            }
            _ => String::new(),
        };

        Some(CandidateText { title, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn numbers(items: &[&str]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for item in items {
            *counts.entry(item.to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn matcher(policy: MatchPolicy) -> CandidateMatcher {
        CandidateMatcher::new(Arc::new(Normalizer::default()), policy)
    }

    fn pro11_query() -> Query {
        Query {
            name_terms: set(&["surfacepro11"]),
            cpu_terms: set(&["ultra7", "coreultra7"]),
            ram_terms: set(&["16gb", "16"]),
            storage_terms: set(&["512gb", "512"]),
            color_terms: BTreeSet::new(),
            numeric_tokens: numbers(&["11", "16", "512"]),
        }
    }

    #[test]
    fn test_strict_returns_first_satisfying_candidate() {
        let candidates = vec![
            Listing::new("Surface Pro 11 Core Ultra 7 16GB 512GB", "https://a"),
            Listing::new("Surface Pro 11 Ultra 7 16/512 Black", "https://b"),
        ];
        let (selection, trace) = matcher(MatchPolicy::Strict).select(&pro11_query(), &candidates);
        let selection = selection.unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.listing.url, "https://a");
        assert_eq!(trace.examined(), vec![0]);
    }

    #[test]
    fn test_strict_reports_missing_attribute() {
        let candidates = vec![Listing::new("Surface Pro 11 X Plus 16GB 512GB", "https://a")];
        let (selection, trace) = matcher(MatchPolicy::Strict).select(&pro11_query(), &candidates);
        assert!(selection.is_none());
        assert_eq!(
            trace.events,
            vec![TraceEvent::AttributeMiss { index: 0, attribute: Attribute::Cpu }]
        );
    }

    #[test]
    fn test_scored_threshold_boundary() {
        let query = Query {
            name_terms: set(&["surfacepro11"]),
            cpu_terms: set(&["xplus"]),
            ..Default::default()
        };
        let candidates = vec![Listing::new("Surface Pro 11 X Plus", "https://a")];

        let (selection, trace) = matcher(MatchPolicy::scored(3)).select(&query, &candidates);
        assert!(selection.is_none());
        assert!(trace.events.contains(&TraceEvent::BelowThreshold { index: 0, score: 2, min_score: 3 }));

        let (selection, _) = matcher(MatchPolicy::scored(2)).select(&query, &candidates);
        assert_eq!(selection.unwrap().score, Some(2));
    }

    #[test]
    fn test_scored_ties_keep_earliest() {
        let query = Query {
            name_terms: set(&["surfacepro11"]),
            cpu_terms: set(&["xplus"]),
            ..Default::default()
        };
        let candidates = vec![
            Listing::new("Surface Laptop 7", "https://zero"),
            Listing::new("Surface Pro 11 X Plus", "https://first"),
            Listing::new("Surface Pro 11 X Plus 16GB", "https://second"),
        ];
        let (selection, _) = matcher(MatchPolicy::scored(2)).select(&query, &candidates);
        assert_eq!(selection.unwrap().index, 1);
    }

    #[test]
    fn test_numeric_guard_rejects_prefix_numbers() {
        let query = Query {
            name_terms: set(&["surfacepro1"]),
            numeric_tokens: numbers(&["11"]),
            ..Default::default()
        };
        let candidates = vec![Listing::new("Surface Pro 1", "https://old")];
        let (selection, trace) = matcher(MatchPolicy::Strict).select(&query, &candidates);
        assert!(selection.is_none());
        assert_eq!(
            trace.events,
            vec![TraceEvent::NumericMismatch { index: 0, missing: vec!["11".to_string()] }]
        );

        // Without the guard, fused containment alone would accept it.
        let (selection, _) = matcher(MatchPolicy::Strict)
            .with_numeric_guard(false)
            .select(&query, &candidates);
        assert!(selection.is_some());
    }

    #[test]
    fn test_numeric_guard_reads_persian_digits() {
        let query = Query {
            name_terms: set(&["سرفیسپرو11"]),
            numeric_tokens: numbers(&["11", "16"]),
            ..Default::default()
        };
        let candidates = vec![Listing::new("سرفیس پرو ۱۱ رم ۱۶ گیگ", "https://fa")];
        let (selection, _) = matcher(MatchPolicy::Strict).select(&query, &candidates);
        assert!(selection.is_some());
    }

    #[test]
    fn test_accessories_are_excluded_before_scoring() {
        let candidates = vec![
            Listing::new("Surface Pro 11 Keyboard Ultra 7 16 512", "https://kb"),
            Listing::new("قلم سرفیس پرو 11", "https://pen"),
        ];
        for policy in [MatchPolicy::Strict, MatchPolicy::scored(1)] {
            let (selection, trace) = matcher(policy).select(&pro11_query(), &candidates);
            assert!(selection.is_none());
            assert!(matches!(trace.events[0], TraceEvent::Excluded { index: 0, .. }));
            assert!(trace.examined().is_empty());
        }
    }

    #[test]
    fn test_default_exclusions_spare_open_box_listings() {
        let candidates = vec![
            Listing::new("Surface Slim Pen 2", "https://pen"),
            Listing::new("Surface Pro 11 Ultra 7 16GB 512GB Open Box", "https://open-box"),
        ];
        let (selection, trace) = matcher(MatchPolicy::Strict).select(&pro11_query(), &candidates);
        assert_eq!(selection.unwrap().listing.url, "https://open-box");
        assert_eq!(
            trace.events[0],
            TraceEvent::Excluded { index: 0, token: "slimpen".to_string() }
        );
    }

    #[test]
    fn test_custom_exclusions() {
        let candidates = vec![Listing::new("Surface Pro 11 Ultra 7 16 512 Pen", "https://bundle")];
        let (selection, _) = matcher(MatchPolicy::Strict)
            .with_exclusions(["keyboard"])
            .select(&pro11_query(), &candidates);
        assert!(selection.is_some());
    }

    #[test]
    fn test_color_in_url() {
        let query = Query {
            name_terms: set(&["surfacepro11"]),
            color_terms: set(&["platinum", "پلاتینیوم"]),
            ..Default::default()
        };
        let candidates = vec![
            Listing::new("surface pro 11", "https://shop.ir/product/surface-pro-11-black/"),
            Listing::new(
                "surface pro 11",
                "https://shop.ir/product/surface-pro-11-%D9%BE%D9%84%D8%A7%D8%AA%DB%8C%D9%86%DB%8C%D9%88%D9%85/",
            ),
        ];
        let (selection, _) = matcher(MatchPolicy::Strict)
            .with_color_target(Some(ColorTarget::Url))
            .select(&query, &candidates);
        assert_eq!(selection.unwrap().index, 1);
    }

    #[test]
    fn test_ranked_orders_by_score_then_position() {
        let query = Query {
            name_terms: set(&["surfacepro11"]),
            cpu_terms: set(&["xplus"]),
            ram_terms: set(&["16gb"]),
            ..Default::default()
        };
        let candidates = vec![
            Listing::new("Surface Pro 11 X Plus", "https://a"),
            Listing::new("Surface Pro 11 X Plus 16GB", "https://b"),
            Listing::new("Surface Pro 11 X Plus", "https://c"),
        ];
        let (ranked, _) = matcher(MatchPolicy::scored(2)).ranked(&query, &candidates);
        let order: Vec<usize> = ranked.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 0, 2]);

        let (ranked, _) = matcher(MatchPolicy::Strict).ranked(&query, &candidates);
        let order: Vec<usize> = ranked.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1]);
    }

    #[test]
    fn test_select_is_deterministic() {
        let candidates = vec![
            Listing::new("Surface Pro 11 Ultra 7 16GB 512GB Platinum", "https://a"),
            Listing::new("Surface Pro 11 Ultra 7 16GB 512GB Black", "https://b"),
        ];
        for policy in [MatchPolicy::Strict, MatchPolicy::scored(2)] {
            let m = matcher(policy);
            let (first, first_trace) = m.select(&pro11_query(), &candidates);
            let (second, second_trace) = m.select(&pro11_query(), &candidates);
            assert_eq!(first.map(|s| s.index), second.map(|s| s.index));
            assert_eq!(first_trace, second_trace);
        }
    }
}
