/// Markov generation backend: chain selection, context-driven generation
/// parameters, multi-attempt scoring, validation with fallback phrases,
/// and online learning from positive feedback.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::core::analysis::{self, GENERATED_TONES, NEUTRAL_TONE};
use crate::core::backend::{BackendError, BackendKind, DialogBackend};
use crate::core::chain::MarkovChain;
use crate::core::config::MarkovConfig;
use crate::core::quality;
use crate::schema::context::{is_romantic_tier, DialogContext, UserFeedback};
use crate::schema::dialogs::CharacterDialogs;
use crate::schema::response::{BackendInfo, DialogResponse};

/// Triggers that always get their own chain when trigger-specific chains are on.
pub const KNOWN_TRIGGERS: [&str; 6] = [
    "click",
    "rightclick",
    "hover",
    "compliment",
    "give_gift",
    "deep_conversation",
];

/// Trigger under which configured training data is recorded.
const GENERAL_TRIGGER: &str = "general";

const MAX_ATTEMPTS: usize = 5;
const EARLY_ACCEPT_SCORE: f64 = 0.8;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const LAST_RESORT_PHRASE: &str = "I'm not sure what to say right now...";
const LEARNING_VALUE_SCALE: f64 = 0.8;
const ROMANTIC_LENGTH_BOOST: f64 = 1.2;
const ENGAGEMENT_THRESHOLD: f64 = 0.7;
const MIN_SAMPLE_CHARS: usize = 3;

const DEFAULT_CORPUS: [&str; 8] = [
    "Hello there! How are you doing today?",
    "It's nice to see you again! I've been thinking about you.",
    "Thank you for spending time with me. It means a lot.",
    "I hope you're having a wonderful day! You deserve happiness.",
    "What would you like to talk about? I'm here to listen.",
    "You always know how to make me smile. Thank you for that.",
    "I'm feeling grateful for this moment we're sharing together.",
    "Your presence brightens my day. I'm so glad you're here.",
];

/// Emoji, dingbats and their joiners/selectors.
fn is_pictograph(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0xFE00..=0xFE0F | 0x200D
    )
}

/// Strip pictographs and collapse whitespace.
pub fn clean_training_text(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !is_pictograph(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct MarkovBackend {
    config: MarkovConfig,
    global: MarkovChain,
    chains: FxHashMap<String, MarkovChain>,
    rng: StdRng,
    /// (trigger, text) pairs awaiting the next adaptation step.
    pending: Vec<(String, String)>,
    initialized: bool,
}

impl Default for MarkovBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkovBackend {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Use `rng` for every random choice. A `seed` in the configuration
    /// replaces it at initialization.
    pub fn with_rng(rng: StdRng) -> Self {
        let config = MarkovConfig::default();
        Self {
            global: MarkovChain::new(config.chain_order),
            config,
            chains: FxHashMap::default(),
            rng,
            pending: Vec::new(),
            initialized: false,
        }
    }

    pub fn config(&self) -> &MarkovConfig {
        &self.config
    }

    pub fn global_chain(&self) -> &MarkovChain {
        &self.global
    }

    pub fn trigger_chain(&self, trigger: &str) -> Option<&MarkovChain> {
        self.chains.get(trigger)
    }

    pub fn pending_feedback(&self) -> usize {
        self.pending.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Temperature for `context`, clamped to the configured range.
    pub fn temperature_for(&self, context: &DialogContext) -> f64 {
        temperature_for(&self.config, context)
    }

    /// Target word count for `context`, clamped to the configured range.
    pub fn target_words_for(&self, context: &DialogContext) -> usize {
        target_words_for(&self.config, context)
    }

    /// Train the global chain and, when present, the chain for `trigger`.
    /// Returns false when the cleaned text was too short to use.
    fn learn(&mut self, text: &str, trigger: &str) -> bool {
        let cleaned = clean_training_text(text);
        if cleaned.len() < MIN_SAMPLE_CHARS {
            return false;
        }
        self.global.train(&cleaned);
        if self.config.trigger_specific {
            if let Some(chain) = self.chains.get_mut(trigger) {
                chain.train(&cleaned);
            }
        }
        true
    }

    fn train_initial(&mut self, dialogs: &CharacterDialogs) {
        let training_data = std::mem::take(&mut self.config.training_data);
        for text in &training_data {
            self.learn(text, GENERAL_TRIGGER);
        }

        if self.config.use_dialog_history {
            for entry in dialogs.entries() {
                for response in &entry.responses {
                    self.learn(response, &entry.trigger);
                }
            }
        }

        if training_data.is_empty() && !self.config.use_dialog_history {
            for text in DEFAULT_CORPUS {
                self.learn(text, GENERAL_TRIGGER);
            }
        }
        self.config.training_data = training_data;
    }

    fn adapt(&mut self) {
        let mut learned = 0usize;
        for (trigger, text) in std::mem::take(&mut self.pending) {
            if self.learn(&text, &trigger) {
                learned += 1;
            }
        }

        let max_states = self.config.max_chain_states;
        let mut evicted = self.global.prune_to(max_states);
        for chain in self.chains.values_mut() {
            evicted += chain.prune_to(max_states);
        }

        tracing::info!(
            learned,
            evicted,
            states = self.global.state_count(),
            "markov backend adapted from feedback"
        );
    }

    fn fallback_phrase(&mut self, context: &DialogContext) -> String {
        let source = if !self.config.fallback_phrases.is_empty() {
            &self.config.fallback_phrases
        } else {
            &context.fallback_responses
        };
        source
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| LAST_RESORT_PHRASE.to_string())
    }

    fn build_response(&self, text: String, confidence: f64, context: &DialogContext) -> DialogResponse {
        let confidence = confidence.clamp(0.0, 1.0);
        DialogResponse {
            animation: select_animation(&text, context).to_string(),
            confidence,
            response_type: analysis::classify_response_type(&text).to_string(),
            emotional_tone: analysis::detect_tone(&text, GENERATED_TONES).to_string(),
            topics: analysis::extract_topics(&text),
            memory_importance: memory_importance(&text, self.config.max_words),
            learning_value: confidence * LEARNING_VALUE_SCALE,
            backend: String::new(),
            text,
        }
    }
}

/// Trigger chain when enabled and trained enough, else the global chain
/// when trained enough.
fn select_chain<'a>(
    config: &MarkovConfig,
    global: &'a MarkovChain,
    chains: &'a FxHashMap<String, MarkovChain>,
    trigger: &str,
) -> Option<&'a MarkovChain> {
    if config.trigger_specific {
        if let Some(chain) = chains.get(trigger).filter(|c| c.has_enough_data()) {
            return Some(chain);
        }
    }
    global.has_enough_data().then_some(global)
}

fn temperature_for(config: &MarkovConfig, context: &DialogContext) -> f64 {
    let mut temperature = config.temperature_midpoint();

    if config.use_personality {
        let creativity = context.trait_weight("creativity");
        let spontaneity = context.trait_weight("spontaneity");
        temperature += (creativity + spontaneity - 1.0) * 0.2;
    }

    if config.mood_influence > 0.0 {
        let mood_factor = (context.current_mood - 50.0) / 100.0;
        temperature += mood_factor * config.mood_influence * 0.1;
    }

    temperature.clamp(config.temperature_min, config.temperature_max)
}

fn is_conversation_trigger(trigger: &str) -> bool {
    trigger.contains("conversation")
}

fn target_words_for(config: &MarkovConfig, context: &DialogContext) -> usize {
    let mut target = if context.trigger == "hover" {
        config.min_words
    } else if is_conversation_trigger(&context.trigger) {
        config.max_words
    } else {
        config.word_midpoint()
    };

    if is_romantic_tier(&context.relationship_level) {
        target = (target as f64 * ROMANTIC_LENGTH_BOOST) as usize;
    }

    target.clamp(config.min_words, config.max_words)
}

/// Multiplier from the first favourite the text closely matches.
fn favorite_boost(text: &str, context: &DialogContext) -> f64 {
    for favorite in &context.extension.favorites {
        let similarity = quality::jaccard_similarity(text, &favorite.response);
        let boost = if similarity > 0.8 {
            favorite
                .rating
                .map_or(1.5, |rating| 1.0 + (rating / 5.0) * 0.6)
        } else if similarity > 0.6 {
            1.2
        } else {
            1.0
        };
        if boost > 1.0 {
            return boost;
        }
    }
    1.0
}

/// Run up to `attempts` candidates and keep the best-scoring one, stopping
/// as soon as a score exceeds [`EARLY_ACCEPT_SCORE`]. Returns the best
/// text, its score and the number of attempts made.
fn best_of(
    attempts: usize,
    mut candidate: impl FnMut() -> (String, f64),
    mut score: impl FnMut(&str, f64) -> f64,
) -> (String, f64, usize) {
    let mut best_text = String::new();
    let mut best_score = 0.0;
    let mut made = 0;
    while made < attempts {
        let (text, confidence) = candidate();
        let candidate_score = score(&text, confidence);
        tracing::debug!(attempt = made, score = candidate_score, confidence, "markov candidate scored");
        made += 1;

        if candidate_score > best_score {
            best_score = candidate_score;
            best_text = text;
        }
        if candidate_score > EARLY_ACCEPT_SCORE {
            break;
        }
    }
    (best_text, best_score, made)
}

fn personality_adjustment_enabled(config: &MarkovConfig) -> bool {
    config.use_personality && config.personality_boost != 0.0
}

/// Hook for trait-specific phrasing, active only with `usePersonality` and a
/// non-zero `personalityBoost`. Text passes through unchanged today.
fn adjust_for_personality(config: &MarkovConfig, text: String, context: &DialogContext) -> String {
    if personality_adjustment_enabled(config) {
        tracing::trace!(
            trigger = %context.trigger,
            boost = config.personality_boost,
            "personality hook ran"
        );
    }
    text
}

/// Score a candidate for the attempt search. Starts from the chain's
/// confidence; not clamped, so boosts may push it past 1.0.
pub(crate) fn score_candidate(
    config: &MarkovConfig,
    text: &str,
    confidence: f64,
    target_words: usize,
    context: &DialogContext,
) -> f64 {
    let mut score = confidence;
    let lower = text.to_lowercase();

    let length_ratio = text.split_whitespace().count() as f64 / target_words.max(1) as f64;
    if !(0.5..=2.0).contains(&length_ratio) {
        score *= 0.8;
    }

    for forbidden in &config.forbidden_words {
        if !forbidden.is_empty() && lower.contains(&forbidden.to_lowercase()) {
            score *= 0.5;
        }
    }

    if !config.required_words.is_empty() {
        score *= 1.0 + quality::required_fraction(text, &config.required_words) * 0.2;
    }

    if config.similarity_penalty > 0.0 {
        score *= 1.0 - quality::similarity_to_recent(text, context) * config.similarity_penalty;
    }

    score * favorite_boost(text, context)
}

fn select_animation(text: &str, context: &DialogContext) -> &'static str {
    if let Some(animation) = analysis::keyword_animation(text) {
        return animation;
    }
    match context.trigger.as_str() {
        "compliment" => "blushing",
        "give_gift" => "excited_romance",
        "deep_conversation" => "romantic_idle",
        _ => "talking",
    }
}

fn memory_importance(text: &str, max_words: usize) -> f64 {
    let mut importance = 0.5;
    if analysis::detect_tone(text, GENERATED_TONES) != NEUTRAL_TONE {
        importance += 0.2;
    }
    if analysis::classify_response_type(text) == "romantic" {
        importance += 0.3;
    }
    if text.split_whitespace().count() > max_words / 2 {
        importance += 0.1;
    }
    f64::min(importance, 1.0)
}

impl DialogBackend for MarkovBackend {
    fn initialize(
        &mut self,
        config: &serde_json::Value,
        dialogs: &CharacterDialogs,
    ) -> Result<(), BackendError> {
        let config = MarkovConfig::from_value(config.clone())?;

        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        self.global = MarkovChain::new(config.chain_order);
        self.chains.clear();
        if config.trigger_specific {
            let triggers = KNOWN_TRIGGERS
                .iter()
                .map(|t| t.to_string())
                .chain(dialogs.triggers());
            for trigger in triggers {
                self.chains
                    .entry(trigger)
                    .or_insert_with(|| MarkovChain::new(config.chain_order));
            }
        }
        self.config = config;
        self.pending.clear();

        self.train_initial(dialogs);
        self.initialized = true;

        tracing::info!(
            order = self.config.chain_order,
            states = self.global.state_count(),
            starters = self.global.starter_count(),
            trigger_chains = self.chains.len(),
            "markov backend initialized"
        );
        Ok(())
    }

    fn generate_response(&mut self, context: &DialogContext) -> Result<DialogResponse, BackendError> {
        if !self.initialized {
            return Err(BackendError::NotInitialized {
                backend: BackendKind::MarkovChain.name().to_string(),
            });
        }

        let Self {
            config,
            global,
            chains,
            rng,
            ..
        } = self;

        let chain = select_chain(config, global, chains, &context.trigger).ok_or_else(|| {
            BackendError::InsufficientData {
                trigger: context.trigger.clone(),
            }
        })?;

        let temperature = temperature_for(config, context);
        let target_words = target_words_for(config, context);
        tracing::debug!(
            trigger = %context.trigger,
            states = chain.state_count(),
            temperature,
            target_words,
            "markov chain selected"
        );

        let (best_text, best_score, _) = best_of(
            MAX_ATTEMPTS,
            || chain.generate(target_words, temperature, &mut *rng),
            |text, confidence| score_candidate(config, text, confidence, target_words, context),
        );

        let text = adjust_for_personality(config, best_text, context);

        let (text, confidence) = match quality::validate_response(config, &text, context) {
            Ok(()) => (text, best_score),
            Err(rejection) => {
                tracing::warn!(
                    trigger = %context.trigger,
                    reason = %rejection,
                    "generated text rejected, substituting fallback phrase"
                );
                (self.fallback_phrase(context), FALLBACK_CONFIDENCE)
            }
        };

        Ok(self.build_response(text, confidence, context))
    }

    fn can_handle(&self, context: &DialogContext) -> bool {
        self.initialized
            && select_chain(&self.config, &self.global, &self.chains, &context.trigger).is_some()
    }

    fn update_memory(
        &mut self,
        context: &DialogContext,
        response: &DialogResponse,
        feedback: Option<&UserFeedback>,
    ) -> Result<(), BackendError> {
        if self.config.learning_rate <= 0.0 {
            return Ok(());
        }
        let Some(feedback) = feedback else {
            return Ok(());
        };
        if !self.initialized {
            return Err(BackendError::NotInitialized {
                backend: BackendKind::MarkovChain.name().to_string(),
            });
        }

        if feedback.positive && feedback.engagement > ENGAGEMENT_THRESHOLD {
            self.pending
                .push((context.trigger.clone(), response.text.clone()));
            if self.pending.len() >= self.config.adaptation_steps.max(1) {
                self.adapt();
            }
        }
        Ok(())
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            name: BackendKind::MarkovChain.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Markov chain text generation with personality and context awareness"
                .to_string(),
            capabilities: [
                "text_generation",
                "personality_adaptation",
                "context_awareness",
                "trigger_specific_chains",
                "memory_learning",
                "coherence_filtering",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }

    fn train_text(&mut self, text: &str, trigger: &str) {
        if !self.initialized {
            tracing::debug!(trigger, "markov backend not initialized, training text dropped");
            return;
        }
        self.learn(text, trigger);
    }
}
