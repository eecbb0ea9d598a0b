/// Heuristic text metrics and the validation gate generated text must pass.
///
/// None of these scores understand language. Coherence is repetition and
/// article ordering; similarity is plain word overlap.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::core::config::{MarkovConfig, QualityFilters};
use crate::schema::context::DialogContext;

/// How many of the most recent history responses similarity is measured against.
pub const RECENT_WINDOW: usize = 3;

/// Why a candidate text was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QualityRejection {
    #[error("{words} words outside {min}..={max}")]
    Length { words: usize, min: usize, max: usize },
    #[error("coherence {score:.2} below {min:.2}")]
    Incoherent { score: f64, min: f64 },
    #[error("contains forbidden word {0:?}")]
    Forbidden(String),
    #[error("repetition {ratio:.2} above {max:.2}")]
    Repetitive { ratio: f64, max: f64 },
    #[error("not a complete sentence")]
    Incomplete,
    #[error("failed grammar check")]
    Grammar,
    #[error("{count} unique words, need {min}")]
    TooFewUniqueWords { count: usize, min: usize },
    #[error("similarity {similarity:.2} to recent responses above {max:.2}")]
    TooSimilar { similarity: f64, max: f64 },
}

/// Lowercase and strip surrounding `.,!?` from every whitespace token.
pub fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c| matches!(c, '.' | ',' | '!' | '?')).to_lowercase())
        .collect()
}

/// 2 × shared / (len_a + len_b), capped at 1.0.
pub fn word_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set: FxHashSet<&str> = a.iter().map(String::as_str).collect();
    let shared = b.iter().filter(|w| set.contains(w.as_str())).count();
    (2.0 * shared as f64 / (a.len() + b.len()) as f64).min(1.0)
}

/// Highest word overlap between `text` and the most recent history responses.
pub fn similarity_to_recent(text: &str, context: &DialogContext) -> f64 {
    let words = normalize_words(text);
    context
        .recent_responses(RECENT_WINDOW)
        .map(|recent| word_overlap(&words, &normalize_words(recent)))
        .fold(0.0, f64::max)
}

/// Jaccard coefficient over lowercase whitespace tokens.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: FxHashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let set_b: FxHashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    shared as f64 / union as f64
}

/// Count of extra occurrences beyond the first, case-insensitive.
fn repeated_tokens<'a>(words: impl IntoIterator<Item = &'a str>) -> usize {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for word in words {
        *counts.entry(word.to_lowercase()).or_default() += 1;
    }
    counts.values().map(|c| c - 1).sum()
}

/// Cheap coherence used against `coherenceThreshold`: 1 − 0.1 per repeated token.
pub fn simple_coherence(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return 0.5;
    }
    (1.0 - repeated_tokens(words) as f64 * 0.1).clamp(0.0, 1.0)
}

/// Coherence used by the quality filter: repetition-penalized,
/// article-ordering bonused.
pub fn advanced_coherence(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return 0.5;
    }
    let repetition = repeated_tokens(words.iter().copied()) as f64 / words.len() as f64;
    let score = 1.0 - repetition * 0.3 + word_ordering(&words) * 0.2;
    score.clamp(0.0, 1.0)
}

/// Fraction of articles followed by something that is not another
/// article or bare punctuation. 0.5 when there is nothing to check.
pub fn word_ordering(words: &[&str]) -> f64 {
    const ARTICLES: [&str; 3] = ["the", "a", "an"];
    if words.len() < 2 {
        return 0.5;
    }

    let mut checks = 0usize;
    let mut good = 0usize;
    for pair in words.windows(2) {
        let word = pair[0].to_lowercase();
        if !ARTICLES.contains(&word.as_str()) {
            continue;
        }
        checks += 1;
        let next = pair[1].to_lowercase();
        if !ARTICLES.contains(&next.as_str()) && !matches!(next.as_str(), "." | "," | "!") {
            good += 1;
        }
    }

    if checks == 0 {
        0.5
    } else {
        good as f64 / checks as f64
    }
}

/// Repeated tokens over total tokens.
pub fn repetition_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    repeated_tokens(words.iter().copied()) as f64 / words.len() as f64
}

/// `*blushes*` and `(whispers)` style openings.
pub fn is_stage_direction(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with('*') || text.starts_with('(')
}

pub fn is_complete_sentence(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if is_stage_direction(text) {
        return true;
    }
    text.ends_with(['.', '!', '?'])
}

/// Capitalized start and no runaway punctuation.
pub fn passes_grammar_check(text: &str) -> bool {
    let text = text.trim();
    let Some(first) = text.chars().next() else {
        return false;
    };
    if is_stage_direction(text) {
        return true;
    }
    if !first.is_ascii_uppercase() {
        return false;
    }
    !["???", "!!!", ".,", ".!"].iter().any(|bad| text.contains(bad))
}

pub fn count_unique_words(text: &str) -> usize {
    normalize_words(text)
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect::<FxHashSet<_>>()
        .len()
}

/// First configured word found in `text` (case-insensitive substring).
pub fn find_forbidden<'a>(text: &str, forbidden: &'a [String]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    forbidden
        .iter()
        .find(|word| !word.is_empty() && lower.contains(&word.to_lowercase()))
        .map(String::as_str)
}

/// Fraction of configured words present in `text` (case-insensitive substring).
pub fn required_fraction(text: &str, required: &[String]) -> f64 {
    if required.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let found = required
        .iter()
        .filter(|word| lower.contains(&word.to_lowercase()))
        .count();
    found as f64 / required.len() as f64
}

/// Apply every enabled filter. With no filter enabled this always passes.
pub fn check_quality_filters(
    filters: &QualityFilters,
    text: &str,
    context: &DialogContext,
) -> Result<(), QualityRejection> {
    if filters.has_no_active_filters() {
        return Ok(());
    }

    if filters.min_coherence > 0.0 {
        let score = advanced_coherence(text);
        if score < filters.min_coherence {
            return Err(QualityRejection::Incoherent {
                score,
                min: filters.min_coherence,
            });
        }
    }
    if filters.max_repetition > 0.0 {
        let ratio = repetition_ratio(text);
        if ratio > filters.max_repetition {
            return Err(QualityRejection::Repetitive {
                ratio,
                max: filters.max_repetition,
            });
        }
    }
    if filters.require_complete && !is_complete_sentence(text) {
        return Err(QualityRejection::Incomplete);
    }
    if filters.grammar_check && !passes_grammar_check(text) {
        return Err(QualityRejection::Grammar);
    }
    if filters.min_unique_words > 0 {
        let count = count_unique_words(text);
        if count < filters.min_unique_words {
            return Err(QualityRejection::TooFewUniqueWords {
                count,
                min: filters.min_unique_words,
            });
        }
    }
    if filters.max_similarity > 0.0 {
        let similarity = similarity_to_recent(text, context);
        if similarity > filters.max_similarity {
            return Err(QualityRejection::TooSimilar {
                similarity,
                max: filters.max_similarity,
            });
        }
    }
    Ok(())
}

/// Full validation of a chosen text: length bounds, coherence threshold,
/// forbidden words, then the quality filters.
pub fn validate_response(
    config: &MarkovConfig,
    text: &str,
    context: &DialogContext,
) -> Result<(), QualityRejection> {
    let words = text.split_whitespace().count();
    if words < config.min_words || words > config.max_words {
        return Err(QualityRejection::Length {
            words,
            min: config.min_words,
            max: config.max_words,
        });
    }

    if config.coherence_threshold > 0.0 {
        let score = simple_coherence(text);
        if score < config.coherence_threshold {
            return Err(QualityRejection::Incoherent {
                score,
                min: config.coherence_threshold,
            });
        }
    }

    if let Some(word) = find_forbidden(text, &config.forbidden_words) {
        return Err(QualityRejection::Forbidden(word.to_string()));
    }

    check_quality_filters(&config.quality_filters, text, context)
}
