use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Neutral point of the 0..100 mood scale.
pub const NEUTRAL_MOOD: f64 = 50.0;

/// Relationship levels that receive longer, more involved responses.
pub const ROMANTIC_TIERS: &[&str] = &["Romantic Interest", "Partner"];

/// Returns true if the relationship level is one of the romantic tiers.
pub fn is_romantic_tier(level: &str) -> bool {
    ROMANTIC_TIERS.contains(&level)
}

/// One prior exchange in the interaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub trigger: String,
    pub response: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

/// A response the user marked as a favorite, optionally rated 1-5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub response: String,
    #[serde(default)]
    pub rating: Option<f64>,
}

/// Fields layered onto a base context by specialized callers
/// (chat windows, favorites tracking). Joined with
/// [`DialogContext::with_extension`] before dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextExtension {
    #[serde(default)]
    pub conversation_turn: u32,
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub favorites: Vec<FavoriteResponse>,
}

/// Immutable snapshot of everything a backend may look at when
/// generating a response. Built by the character layer; the dialog
/// engine never reads game state directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogContext {
    pub trigger: String,
    #[serde(default)]
    pub interaction_id: String,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub current_stats: HashMap<String, f64>,
    /// Trait name → weight in 0..1.
    #[serde(default)]
    pub personality_traits: HashMap<String, f64>,
    /// 0..100, 50 is neutral.
    #[serde(default = "default_mood")]
    pub current_mood: f64,
    #[serde(default)]
    pub relationship_level: String,
    #[serde(default)]
    pub animation: String,
    #[serde(default)]
    pub time_of_day: String,
    /// Most recent first.
    #[serde(default)]
    pub interaction_history: Vec<InteractionRecord>,
    #[serde(default)]
    pub fallback_responses: Vec<String>,
    #[serde(default)]
    pub fallback_animation: Option<String>,
    #[serde(default)]
    pub extension: ContextExtension,
}

fn default_mood() -> f64 {
    NEUTRAL_MOOD
}

impl DialogContext {
    /// A context for `trigger` with neutral mood and no history.
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            current_mood: NEUTRAL_MOOD,
            ..Default::default()
        }
    }

    /// Join an extension onto this base context.
    pub fn with_extension(mut self, extension: ContextExtension) -> Self {
        self.extension = extension;
        self
    }

    /// Trait weight, 0.0 when the trait is absent.
    pub fn trait_weight(&self, name: &str) -> f64 {
        self.personality_traits.get(name).copied().unwrap_or(0.0)
    }

    /// The `n` most recent responses from the interaction history.
    pub fn recent_responses(&self, n: usize) -> impl Iterator<Item = &str> {
        self.interaction_history
            .iter()
            .take(n)
            .map(|record| record.response.as_str())
    }
}

/// Feedback reported by the user about a displayed response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserFeedback {
    pub positive: bool,
    /// 0..1, how engaged the user was with the response.
    pub engagement: f64,
}
