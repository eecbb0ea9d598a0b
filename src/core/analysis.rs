/// Keyword classification of response text: type, tone, topics, animation.
///
/// Matching is case-insensitive substring search, so "hi" also matches
/// "this". Rules are checked in order and the first hit wins.

use rustc_hash::FxHashSet;

/// A label applied when any of its keywords appears in the text.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub label: &'static str,
    pub keywords: &'static [&'static str],
}

const fn rule(label: &'static str, keywords: &'static [&'static str]) -> KeywordRule {
    KeywordRule { label, keywords }
}

pub const RESPONSE_TYPES: &[KeywordRule] = &[
    rule("romantic", &["love", "heart", "romance", "kiss", "hug", "together", "forever"]),
    rule("casual", &["hi", "hello", "hey", "thanks", "nice", "good"]),
    rule("emotional", &["feel", "emotion", "happy", "sad", "excited", "nervous"]),
];

/// Tones for generated text.
pub const GENERATED_TONES: &[KeywordRule] = &[
    rule("happy", &["happy", "joy", "excited", "wonderful"]),
    rule("shy", &["shy", "blush", "nervous"]),
    rule("loving", &["love", "adore", "cherish"]),
    rule("sad", &["sad", "sorry", "miss"]),
];

/// Tones for scripted table responses.
pub const SCRIPTED_TONES: &[KeywordRule] = &[
    rule("happy", &["happy", "joy", "excited", "wonderful"]),
    rule("romantic", &["love", "heart", "dear", "darling"]),
    rule("shy", &["shy", "blush", "nervous"]),
    rule("sad", &["sad", "sorry", "miss"]),
];

pub const TOPICS: &[KeywordRule] = &[
    rule("relationship", &["love", "relationship", "together", "partner", "couple"]),
    rule("feelings", &["feel", "emotion", "heart", "mood", "sentiment"]),
    rule("gratitude", &["thank", "grateful", "appreciate", "thankful"]),
    rule("conversation", &["talk", "chat", "discuss", "conversation", "speak"]),
    rule("future", &["future", "tomorrow", "plan", "hope", "dream"]),
    rule("past", &["remember", "memory", "past", "before", "ago"]),
];

const KEYWORD_ANIMATIONS: &[KeywordRule] = &[
    rule("heart_eyes", &["love", "heart"]),
    rule("happy", &["thank", "grateful"]),
    rule("blushing", &["shy", "blush"]),
    rule("sad", &["sad", "sorry"]),
];

pub const GENERAL_TYPE: &str = "general";
pub const NEUTRAL_TONE: &str = "neutral";

pub fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lower.contains(k))
}

/// Label of the first matching rule.
pub fn first_match(text: &str, rules: &[KeywordRule]) -> Option<&'static str> {
    let lower = text.to_lowercase();
    rules
        .iter()
        .find(|r| contains_any(&lower, r.keywords))
        .map(|r| r.label)
}

pub fn classify_response_type(text: &str) -> &'static str {
    first_match(text, RESPONSE_TYPES).unwrap_or(GENERAL_TYPE)
}

pub fn detect_tone(text: &str, rules: &[KeywordRule]) -> &'static str {
    first_match(text, rules).unwrap_or(NEUTRAL_TONE)
}

/// Every topic with at least one keyword present.
pub fn extract_topics(text: &str) -> FxHashSet<String> {
    let lower = text.to_lowercase();
    TOPICS
        .iter()
        .filter(|r| contains_any(&lower, r.keywords))
        .map(|r| r.label.to_string())
        .collect()
}

/// Animation suggested by emotional keywords, if any.
pub fn keyword_animation(text: &str) -> Option<&'static str> {
    first_match(text, KEYWORD_ANIMATIONS)
}
