// Candidate acceptance policies: strict all-attribute containment and weighted scoring
use super::query::{Attribute, Query};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_MIN_SCORE: u32 = 2;

const ATTRIBUTES: [Attribute; 5] = [
    Attribute::Name,
    Attribute::Cpu,
    Attribute::Ram,
    Attribute::Storage,
    Attribute::Color,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every non-empty attribute must hit; the first such candidate wins.
    Strict,
    /// Highest weighted count of covered attributes wins if it reaches `min_score`.
    Scored {
        #[serde(default = "default_min_score")]
        min_score: u32,
        #[serde(default)]
        weights: ScoreWeights,
    },
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::Strict
    }
}

impl MatchPolicy {
    pub fn scored(min_score: u32) -> Self {
        MatchPolicy::Scored {
            min_score,
            weights: ScoreWeights::default(),
        }
    }
}

fn default_min_score() -> u32 {
    DEFAULT_MIN_SCORE
}

fn one() -> u32 {
    1
}

/// Points an attribute adds when any of its terms hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "one")]
    pub name: u32,
    #[serde(default = "one")]
    pub cpu: u32,
    #[serde(default = "one")]
    pub ram: u32,
    #[serde(default = "one")]
    pub storage: u32,
    #[serde(default = "one")]
    pub color: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            name: 1,
            cpu: 1,
            ram: 1,
            storage: 1,
            color: 1,
        }
    }
}

impl ScoreWeights {
    fn weight(&self, attribute: Attribute) -> u32 {
        match attribute {
            Attribute::Name => self.name,
            Attribute::Cpu => self.cpu,
            Attribute::Ram => self.ram,
            Attribute::Storage => self.storage,
            Attribute::Color => self.color,
        }
    }
}

/// Where color terms are looked up during attribute matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTarget {
    Title,
    Url,
}

/// Normalized haystacks of one candidate.
#[derive(Debug, Clone, Default)]
pub struct CandidateText {
    pub title: String,
    pub url: String,
}

impl CandidateText {
    fn haystack(&self, attribute: Attribute, color_target: Option<ColorTarget>) -> Option<&str> {
        match (attribute, color_target) {
            (Attribute::Color, None) => None,
            (Attribute::Color, Some(ColorTarget::Url)) => Some(&self.url),
            _ => Some(&self.title),
        }
    }
}

fn hits(terms: &BTreeSet<String>, haystack: &str) -> bool {
    terms.is_empty() || terms.iter().any(|t| !t.is_empty() && haystack.contains(t.as_str()))
}

/// First attribute whose terms all miss, or `None` when the candidate satisfies the query.
pub fn missing_attribute(
    query: &Query,
    text: &CandidateText,
    color_target: Option<ColorTarget>,
) -> Option<Attribute> {
    ATTRIBUTES.into_iter().find(|attribute| {
        text.haystack(*attribute, color_target)
            .is_some_and(|haystack| !hits(query.terms(*attribute), haystack))
    })
}

/// Sum of the weights of every non-empty attribute with at least one term in the candidate.
///
/// Surface forms of one attribute never add up: "16GB" hits `16gb`, `16g` and `16`
/// but covers RAM only once.
pub fn score(
    query: &Query,
    text: &CandidateText,
    weights: &ScoreWeights,
    color_target: Option<ColorTarget>,
) -> u32 {
    ATTRIBUTES
        .into_iter()
        .filter(|attribute| {
            let terms = query.terms(*attribute);
            !terms.is_empty()
                && text
                    .haystack(*attribute, color_target)
                    .is_some_and(|haystack| hits(terms, haystack))
        })
        .map(|attribute| weights.weight(attribute))
        .sum()
}
