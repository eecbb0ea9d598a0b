/// Backend configuration: JSON shapes, defaults and bound checks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check_range(field, value, 1.0)
}

fn check_range(field: &'static str, value: f64, max: f64) -> Result<(), ConfigError> {
    if !(0.0..=max).contains(&value) {
        return Err(invalid(field, format!("must be within 0..{max}, got {value}")));
    }
    Ok(())
}

/// Post-generation gates. All-zero/all-false means every text passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityFilters {
    pub min_coherence: f64,
    pub max_repetition: f64,
    pub require_complete: bool,
    pub grammar_check: bool,
    pub min_unique_words: usize,
    pub max_similarity: f64,
}

impl QualityFilters {
    pub fn has_no_active_filters(&self) -> bool {
        self.min_coherence == 0.0
            && self.max_repetition == 0.0
            && !self.require_complete
            && !self.grammar_check
            && self.min_unique_words == 0
            && self.max_similarity == 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("qualityFilters.minCoherence", self.min_coherence)?;
        check_unit("qualityFilters.maxRepetition", self.max_repetition)?;
        check_unit("qualityFilters.maxSimilarity", self.max_similarity)?;
        Ok(())
    }
}

/// Configuration of the Markov generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkovConfig {
    pub chain_order: usize,
    pub min_words: usize,
    pub max_words: usize,
    pub temperature_min: f64,
    pub temperature_max: f64,

    pub training_data: Vec<String>,
    /// Paths read by the owning application and fed through `train_text`.
    pub training_files: Vec<String>,
    pub use_dialog_history: bool,
    pub use_personality: bool,

    pub forbidden_words: Vec<String>,
    pub required_words: Vec<String>,
    /// 0..2
    pub personality_boost: f64,
    /// 0..2
    pub mood_influence: f64,
    pub trigger_specific: bool,

    pub learning_rate: f64,
    pub adaptation_steps: usize,
    pub max_chain_states: usize,

    pub coherence_threshold: f64,
    pub similarity_penalty: f64,
    pub fallback_phrases: Vec<String>,
    pub quality_filters: QualityFilters,

    /// Fixed RNG seed. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for MarkovConfig {
    fn default() -> Self {
        Self {
            chain_order: 2,
            min_words: 3,
            max_words: 15,
            temperature_min: 0.3,
            temperature_max: 0.8,
            training_data: Vec::new(),
            training_files: Vec::new(),
            use_dialog_history: false,
            use_personality: false,
            forbidden_words: Vec::new(),
            required_words: Vec::new(),
            personality_boost: 0.0,
            mood_influence: 0.0,
            trigger_specific: false,
            learning_rate: 0.0,
            adaptation_steps: 1,
            max_chain_states: 5000,
            coherence_threshold: 0.0,
            similarity_penalty: 0.0,
            fallback_phrases: Vec::new(),
            quality_filters: QualityFilters::default(),
            seed: None,
        }
    }
}

impl MarkovConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=5).contains(&self.chain_order) {
            return Err(invalid("chainOrder", format!("must be 1-5, got {}", self.chain_order)));
        }
        if self.max_words < 1 || self.max_words > 50 {
            return Err(invalid("maxWords", format!("must be 1-50, got {}", self.max_words)));
        }
        if self.min_words < 1 || self.min_words > self.max_words {
            return Err(invalid(
                "minWords",
                format!("must be >= 1 and <= maxWords ({}), got {}", self.max_words, self.min_words),
            ));
        }
        if self.temperature_min < 0.0
            || self.temperature_min > self.temperature_max
            || self.temperature_max > 2.0
        {
            return Err(invalid(
                "temperature",
                format!(
                    "must satisfy 0 <= min <= max <= 2, got {}..{}",
                    self.temperature_min, self.temperature_max
                ),
            ));
        }
        check_range("personalityBoost", self.personality_boost, 2.0)?;
        check_range("moodInfluence", self.mood_influence, 2.0)?;
        check_unit("learningRate", self.learning_rate)?;
        check_unit("coherenceThreshold", self.coherence_threshold)?;
        check_unit("similarityPenalty", self.similarity_penalty)?;
        if self.max_chain_states == 0 {
            return Err(invalid("maxChainStates", "must be positive"));
        }
        self.quality_filters.validate()
    }

    pub fn temperature_midpoint(&self) -> f64 {
        (self.temperature_min + self.temperature_max) / 2.0
    }

    pub fn word_midpoint(&self) -> usize {
        (self.min_words + self.max_words) / 2
    }
}

/// Configuration of the table-driven fallback backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FallbackConfig {
    pub personality_influence: f64,
    pub response_variation: f64,
    pub prefer_romance_dialogs: bool,
    pub fallback_responses: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            personality_influence: 0.3,
            response_variation: 0.2,
            prefer_romance_dialogs: true,
            fallback_responses: Vec::new(),
            seed: None,
        }
    }
}

impl FallbackConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("personalityInfluence", self.personality_influence)?;
        check_unit("responseVariation", self.response_variation)?;
        Ok(())
    }
}

/// The character-level block that wires backends into a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogBackendConfig {
    pub enabled: bool,
    pub default_backend: String,
    pub fallback_chain: Vec<String>,
    pub confidence_threshold: f64,
    pub memory_enabled: bool,
    /// Backend name → that backend's own JSON configuration.
    pub backends: HashMap<String, serde_json::Value>,
}

impl Default for DialogBackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_backend: String::new(),
            fallback_chain: Vec::new(),
            confidence_threshold: 0.5,
            memory_enabled: false,
            backends: HashMap::new(),
        }
    }
}

impl DialogBackendConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("confidenceThreshold", self.confidence_threshold)?;
        if self.enabled && self.default_backend.is_empty() {
            return Err(invalid("defaultBackend", "required when enabled"));
        }
        Ok(())
    }

    /// Configuration object for a backend, `{}` when none is given.
    pub fn backend_value(&self, name: &str) -> serde_json::Value {
        self.backends
            .get(name)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }
}
