//! Defect and wish extraction over raw review text.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::lexicon::DefectType;

/// Example quotes kept per defect type or feature request.
pub const MAX_QUOTES: usize = 3;

/// Quotes are clipped to this many bytes (on a char boundary).
const QUOTE_MAX_LEN: usize = 300;

/// Reviews at or below this rating count as negative.
const NEGATIVE_RATING_CEILING: f64 = 3.0;

/// Wish tails outside this length band are discarded as noise.
const WISH_MIN_LEN: usize = 5;
const WISH_MAX_LEN: usize = 100;

/// A feature request must be phrased at least this often to be kept.
const WISH_MIN_MENTIONS: u32 = 2;

/// The input shape: review body plus its star rating.
#[derive(Debug, Clone)]
pub struct ReviewDoc {
    pub body: String,
    pub rating: f64,
}

/// Aggregated evidence for one defect type across a product's negative
/// reviews.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectSignal {
    pub defect_type: DefectType,
    pub frequency: u32,
    pub severity_score: f64,
    pub example_quotes: Vec<String>,
    pub total_reviews_scanned: usize,
    pub negative_reviews_scanned: usize,
}

/// A normalized "I wish" phrase with its mention count.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRequest {
    pub feature: String,
    pub mentions: u32,
    pub confidence: f64,
    pub source_quotes: Vec<String>,
}

/// Everything the defect pass produces, including the coverage inputs the
/// profile builder needs.
#[derive(Debug, Clone, Default)]
pub struct DefectExtraction {
    pub signals: Vec<DefectSignal>,
    pub total_reviews: usize,
    pub negative_reviews: usize,
    /// Negative reviews matching at least one defect type.
    pub matched_negative_reviews: usize,
}

static WISH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)i (?:\w+ )?wish (?:it )?(?:had|was|were|could|would)(.*?)(?:\.|!|$)",
        r"(?i)would be (?:nice|great|better|awesome) if(.*?)(?:\.|!|$)",
        r"(?i)should (?:have|come with|include)(.*?)(?:\.|!|$)",
        r"(?i)needs? (?:a |an |to have )(.*?)(?:\.|!|$)",
        r"(?i)(?:missing|lacks?) (?:a |an )?(.*?)(?:\.|!|$)",
        r"(?i)if only (?:it )?(.*?)(?:\.|!|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("wish pattern compiles"))
    .collect()
});

/// Stop words stripped before wish phrases are grouped. Kept small so
/// domain-specific terms survive; the second block removes niche words that
/// appear in nearly every wish and would create false groupings.
static WISH_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "it", "its", "is", "was", "were", "be", "been", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "can", "may", "might", "shall",
        "to", "of", "in", "on", "for", "with", "at", "by", "from", "that", "this", "these",
        "those", "and", "or", "but", "not", "so", "if", "then", "also", "just", "very", "really",
        "too", "more", "much", "some", "any", "all", "my", "your", "their", "our", "i", "me",
        "you", "we", "they", "came", "come", "built", "one", "like",
        // niche terms
        "phone", "mount", "car", "holder", "dashboard", "windshield", "stand", "cradle",
        "bracket", "device",
    ]
    .into_iter()
    .collect()
});

fn is_negative(review: &ReviewDoc) -> bool {
    review.rating <= NEGATIVE_RATING_CEILING && !review.body.is_empty()
}

fn clip_quote(body: &str) -> String {
    if body.len() <= QUOTE_MAX_LEN {
        return body.to_owned();
    }
    let mut end = QUOTE_MAX_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_owned()
}

/// Scans negative reviews against the defect lexicon.
///
/// A review matches a type iff any of that type's keywords occurs in the
/// lowercased body; one review may match several types. Severity is
/// `min(1, base_weight · min(1, 2·frequency/negatives))`. Results are sorted
/// by severity, then frequency, then type name — the same order used to pick
/// the dominant pain downstream.
#[must_use]
pub fn extract_defects(reviews: &[ReviewDoc]) -> DefectExtraction {
    let negative: Vec<&ReviewDoc> = reviews.iter().filter(|r| is_negative(r)).collect();
    let total = reviews.len();
    let negative_count = negative.len();
    if negative.is_empty() {
        return DefectExtraction {
            total_reviews: total,
            ..DefectExtraction::default()
        };
    }

    let mut frequencies: BTreeMap<DefectType, u32> = BTreeMap::new();
    let mut quotes: BTreeMap<DefectType, Vec<String>> = BTreeMap::new();
    let mut matched_reviews = 0usize;

    for review in &negative {
        let text = review.body.to_lowercase();
        let mut matched_any = false;
        for defect in DefectType::ALL {
            if defect.keywords().iter().any(|kw| text.contains(kw)) {
                *frequencies.entry(defect).or_default() += 1;
                quotes.entry(defect).or_default().push(clip_quote(&review.body));
                matched_any = true;
            }
        }
        if matched_any {
            matched_reviews += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let mut signals: Vec<DefectSignal> = frequencies
        .into_iter()
        .map(|(defect_type, frequency)| {
            let frequency_factor =
                (2.0 * f64::from(frequency) / negative_count as f64).min(1.0);
            let severity_score = (defect_type.base_weight() * frequency_factor).min(1.0);
            let mut examples = quotes.remove(&defect_type).unwrap_or_default();
            // Shortest quotes first: they carry the match with the least
            // payload.
            examples.sort_by_key(String::len);
            examples.truncate(MAX_QUOTES);
            DefectSignal {
                defect_type,
                frequency,
                severity_score,
                example_quotes: examples,
                total_reviews_scanned: total,
                negative_reviews_scanned: negative_count,
            }
        })
        .collect();

    signals.sort_by(|a, b| {
        b.severity_score
            .total_cmp(&a.severity_score)
            .then(b.frequency.cmp(&a.frequency))
            .then(a.defect_type.as_str().cmp(b.defect_type.as_str()))
    });

    DefectExtraction {
        signals,
        total_reviews: total,
        negative_reviews: negative_count,
        matched_negative_reviews: matched_reviews,
    }
}

/// Lowercases, strips punctuation, drops stop words, and collapses
/// whitespace so different phrasings of the same wish group together.
fn normalize_wish(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.len() > 1 && !WISH_STOPWORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

struct WishAgg {
    mentions: u32,
    quotes: Vec<String>,
}

/// Extracts feature requests from all review bodies (not only negative
/// ones) via the wish patterns.
///
/// Mention counts aggregate per normalized phrase; one-off phrasings are
/// dropped. Confidence is `min(1, mentions/10)` — a later offline pass may
/// revise it. Results are sorted by mentions, then phrase.
#[must_use]
pub fn extract_wishes(reviews: &[ReviewDoc]) -> Vec<FeatureRequest> {
    let mut hits: BTreeMap<String, WishAgg> = BTreeMap::new();

    for review in reviews {
        if review.body.is_empty() {
            continue;
        }
        for pattern in WISH_PATTERNS.iter() {
            for captures in pattern.captures_iter(&review.body) {
                let Some(tail) = captures.get(1) else {
                    continue;
                };
                let raw = tail.as_str().trim().trim_end_matches(['.', ',', '!', '?']);
                if raw.len() < WISH_MIN_LEN || raw.len() > WISH_MAX_LEN {
                    continue;
                }
                let key = normalize_wish(raw);
                if key.is_empty() {
                    continue;
                }
                let entry = hits.entry(key).or_insert(WishAgg {
                    mentions: 0,
                    quotes: Vec::new(),
                });
                entry.mentions += 1;
                if entry.quotes.len() < MAX_QUOTES {
                    entry.quotes.push(clip_quote(&review.body));
                }
            }
        }
    }

    let mut requests: Vec<FeatureRequest> = hits
        .into_iter()
        .filter(|(_, agg)| agg.mentions >= WISH_MIN_MENTIONS)
        .map(|(feature, agg)| FeatureRequest {
            confidence: (f64::from(agg.mentions) / 10.0).min(1.0),
            feature,
            mentions: agg.mentions,
            source_quotes: agg.quotes,
        })
        .collect();

    requests.sort_by(|a, b| b.mentions.cmp(&a.mentions).then(a.feature.cmp(&b.feature)));
    requests
}
