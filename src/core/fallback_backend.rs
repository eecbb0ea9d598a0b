/// Table-driven fallback backend. Picks from the character's own dialog
/// tables, or from built-in per-trigger lines, weighted by personality.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::core::analysis::{self, NEUTRAL_TONE, SCRIPTED_TONES};
use crate::core::backend::{BackendError, BackendKind, DialogBackend};
use crate::core::config::FallbackConfig;
use crate::schema::context::{is_romantic_tier, DialogContext, UserFeedback};
use crate::schema::dialogs::{CharacterDialogs, DialogEntry};
use crate::schema::response::{BackendInfo, DialogResponse};

const FIXED_CONFIDENCE: f64 = 0.8;
const RESPONSE_TYPE: &str = "simple";
const TRAIT_THRESHOLD: f64 = 0.7;
const LONG_RESPONSE_WORDS: usize = 10;
const ROMANCE_KEYWORDS: &[&str] = &["love", "heart", "dear", "darling", "sweet"];
const STRANGER: &str = "Stranger";

/// Decides whether a table entry may fire right now. Requirements and
/// cooldowns belong to the game-state layer, which implements this.
pub trait DialogGate: Send {
    fn is_available(&self, entry: &DialogEntry, context: &DialogContext) -> bool;
}

impl<F> DialogGate for F
where
    F: Fn(&DialogEntry, &DialogContext) -> bool + Send,
{
    fn is_available(&self, entry: &DialogEntry, context: &DialogContext) -> bool {
        self(entry, context)
    }
}

/// Checks stat requirements against the context snapshot. Cooldowns are
/// not tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatRequirementGate;

impl DialogGate for StatRequirementGate {
    fn is_available(&self, entry: &DialogEntry, context: &DialogContext) -> bool {
        entry.requirements_met(&context.current_stats)
    }
}

/// Built-in lines for the known triggers, with personality and
/// relationship additions. `None` for unknown triggers.
fn builtin_responses(context: &DialogContext) -> Option<Vec<&'static str>> {
    let shyness = context.trait_weight("shyness");
    let relationship = context.relationship_level.as_str();

    let lines = match context.trigger.as_str() {
        "click" => {
            let mut lines = vec![
                "Hello! Nice to see you! 👋",
                "Hi there! How are you doing today?",
                "Thanks for visiting me! 😊",
                "What would you like to talk about?",
                "I'm so happy you're here!",
            ];
            if shyness > TRAIT_THRESHOLD {
                lines.extend(["H-hello... *blushes*", "Oh, hi there... 😳"]);
            }
            if context.trait_weight("romanticism") > TRAIT_THRESHOLD && relationship != STRANGER {
                lines.extend(["Hello, my dear! 💕", "I've been thinking about you..."]);
            }
            lines
        }
        "rightclick" => {
            let mut lines = vec![
                "How can I help you today?",
                "What's on your mind?",
                "Is there something you'd like to know?",
                "I'm here to listen! 😊",
                "What would you like to do?",
            ];
            if context.trait_weight("helpfulness") > TRAIT_THRESHOLD {
                lines.extend(["I'm always here to help!", "Let me know what you need!"]);
            }
            lines
        }
        "hover" => {
            let mut lines = vec!["Hi! 👋", "Hello there!", "*waves*", "😊", "Nice to see you!"];
            if shyness > TRAIT_THRESHOLD {
                lines.extend(["*shy wave*", "👀"]);
            }
            lines
        }
        "compliment" => {
            let mut lines = vec![
                "Thank you so much! That means a lot! 😊",
                "You're so sweet! 💕",
                "That really makes me happy!",
                "Aww, you're too kind!",
                "I appreciate that! 🤗",
            ];
            if shyness > TRAIT_THRESHOLD {
                lines.extend(["*blushes* Th-thank you...", "You really think so? 😳"]);
            }
            if context.trait_weight("confidence") > TRAIT_THRESHOLD {
                lines.extend(["I know, right? 😄", "Thank you for noticing!"]);
            }
            lines
        }
        "give_gift" => {
            let mut lines = vec![
                "A gift for me? Thank you so much! 🎁",
                "You shouldn't have! But I love it! 💕",
                "This is so thoughtful of you!",
                "I'll treasure this! Thank you! 😊",
                "You always know how to make me happy!",
            ];
            if is_romantic_tier(relationship) {
                lines.extend([
                    "You spoil me! I love you! 💖",
                    "This means the world to me, darling!",
                ]);
            }
            lines
        }
        "deep_conversation" => {
            let mut lines = vec![
                "I love having deep conversations with you.",
                "What's been on your mind lately?",
                "Tell me more about how you're feeling.",
                "I'm always here to listen to you.",
                "These moments mean so much to me.",
            ];
            if matches!(relationship, "Close Friend" | "Romantic Interest") {
                lines.extend([
                    "I feel so connected to you when we talk like this.",
                    "You can always share anything with me.",
                ]);
            }
            lines
        }
        _ => return None,
    };
    Some(lines)
}

/// Single line chosen from mood, then relationship.
fn mood_response(context: &DialogContext) -> &'static str {
    if context.current_mood > 80.0 {
        return "I'm feeling great today! 😄";
    }
    if context.current_mood < 30.0 {
        return "I'm not feeling my best right now... 😔";
    }
    match context.relationship_level.as_str() {
        "Stranger" => "Hello! Nice to meet you!",
        "Friend" => "Hey there, friend! 😊",
        "Close Friend" => "It's always great to see you!",
        "Romantic Interest" => "Hello, my dear! 💕",
        "Partner" => "Hi sweetheart! I love you! 💖",
        _ => "Hello! 👋",
    }
}

/// Selection weight for a line. 1.0 is neutral; `influence` scales how
/// far personality may move it.
pub fn personality_score(response: &str, context: &DialogContext, influence: f64) -> f64 {
    if influence == 0.0 {
        return 1.0;
    }
    let mut score = 1.0;

    let shyness = context.trait_weight("shyness");
    if shyness > 0.0 {
        if response.split_whitespace().count() > LONG_RESPONSE_WORDS {
            score -= shyness * 0.3;
        }
        if response.contains('!') {
            score -= shyness * 0.2;
        }
    }

    let romanticism = context.trait_weight("romanticism");
    if romanticism > 0.0 && analysis::contains_any(&response.to_lowercase(), ROMANCE_KEYWORDS) {
        score += romanticism * 0.4;
    }

    1.0 + (score - 1.0) * influence
}

fn trigger_animation(trigger: &str) -> &'static str {
    match trigger {
        "compliment" => "blushing",
        "rightclick" => "thinking",
        _ => "talking",
    }
}

fn memory_importance(text: &str) -> f64 {
    let tone = analysis::detect_tone(text, SCRIPTED_TONES);
    let mut importance = 0.3;
    if tone == "romantic" {
        importance += 0.4;
    }
    if tone != NEUTRAL_TONE {
        importance += 0.2;
    }
    f64::min(importance, 1.0)
}

pub struct FallbackBackend {
    config: FallbackConfig,
    dialogs: CharacterDialogs,
    gate: Box<dyn DialogGate>,
    rng: StdRng,
    initialized: bool,
}

impl Default for FallbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackBackend {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Use `rng` for every random choice. A `seed` in the configuration
    /// replaces it at initialization.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            config: FallbackConfig::default(),
            dialogs: CharacterDialogs::default(),
            gate: Box::new(StatRequirementGate),
            rng,
            initialized: false,
        }
    }

    /// Replace the requirement/cooldown check for table entries.
    pub fn with_gate(mut self, gate: impl DialogGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Lines (with their entry animation) from the first table group that
    /// has an available entry for the trigger.
    fn table_candidates(&self, context: &DialogContext) -> Vec<(String, Option<String>)> {
        let romance_first =
            self.config.prefer_romance_dialogs && context.relationship_level != STRANGER;
        let groups: [&[DialogEntry]; 2] = if romance_first {
            [&self.dialogs.romance, &self.dialogs.basic]
        } else {
            [&self.dialogs.basic, &self.dialogs.romance]
        };

        for group in groups {
            let candidates: Vec<(String, Option<String>)> = group
                .iter()
                .filter(|entry| entry.trigger == context.trigger)
                .filter(|entry| self.gate.is_available(entry, context))
                .flat_map(|entry| {
                    entry
                        .responses
                        .iter()
                        .map(|r| (r.clone(), entry.animation.clone()))
                })
                .collect();
            if !candidates.is_empty() {
                return candidates;
            }
        }
        Vec::new()
    }

    /// Personality-weighted index, blended toward uniform by `responseVariation`.
    fn pick_weighted(&mut self, lines: &[&str], context: &DialogContext) -> usize {
        if lines.len() <= 1 {
            return 0;
        }

        let mut weights: Vec<f64> = lines
            .iter()
            .map(|line| personality_score(line, context, self.config.personality_influence).max(0.0))
            .collect();
        let mean = weights.iter().sum::<f64>() / weights.len() as f64;
        let variation = self.config.response_variation;
        for weight in &mut weights {
            *weight = (1.0 - variation) * *weight + variation * mean;
        }

        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => self.rng.gen_range(0..lines.len()),
        }
    }

    fn unknown_trigger_response(&mut self, context: &DialogContext) -> String {
        if let Some(line) = self.config.fallback_responses.choose(&mut self.rng) {
            return line.clone();
        }
        if let Some(line) = context.fallback_responses.choose(&mut self.rng) {
            return line.clone();
        }
        mood_response(context).to_string()
    }

    fn select_animation(text: &str, entry_animation: Option<String>, context: &DialogContext) -> String {
        entry_animation
            .filter(|a| !a.is_empty())
            .or_else(|| context.fallback_animation.clone().filter(|a| !a.is_empty()))
            .unwrap_or_else(|| {
                analysis::keyword_animation(text)
                    .unwrap_or_else(|| trigger_animation(&context.trigger))
                    .to_string()
            })
    }
}

impl DialogBackend for FallbackBackend {
    fn initialize(
        &mut self,
        config: &serde_json::Value,
        dialogs: &CharacterDialogs,
    ) -> Result<(), BackendError> {
        let config = FallbackConfig::from_value(config.clone())?;
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.config = config;
        self.dialogs = dialogs.clone();
        self.initialized = true;

        tracing::info!(
            entries = self.dialogs.entries().count(),
            personality_influence = self.config.personality_influence,
            "fallback backend initialized"
        );
        Ok(())
    }

    fn generate_response(&mut self, context: &DialogContext) -> Result<DialogResponse, BackendError> {
        if !self.initialized {
            return Err(BackendError::NotInitialized {
                backend: BackendKind::SimpleRandom.name().to_string(),
            });
        }

        let table = self.table_candidates(context);
        let (text, entry_animation) = if !table.is_empty() {
            let lines: Vec<&str> = table.iter().map(|(line, _)| line.as_str()).collect();
            let index = self.pick_weighted(&lines, context);
            table[index].clone()
        } else if let Some(lines) = builtin_responses(context) {
            let index = self.pick_weighted(&lines, context);
            (lines[index].to_string(), None)
        } else {
            (self.unknown_trigger_response(context), None)
        };

        let animation = Self::select_animation(&text, entry_animation, context);
        let emotional_tone = analysis::detect_tone(&text, SCRIPTED_TONES);

        Ok(DialogResponse {
            animation,
            confidence: FIXED_CONFIDENCE,
            response_type: RESPONSE_TYPE.to_string(),
            emotional_tone: emotional_tone.to_string(),
            topics: analysis::extract_topics(&text),
            memory_importance: memory_importance(&text),
            learning_value: 0.0,
            backend: String::new(),
            text,
        })
    }

    fn can_handle(&self, _context: &DialogContext) -> bool {
        true
    }

    fn update_memory(
        &mut self,
        _context: &DialogContext,
        _response: &DialogResponse,
        _feedback: Option<&UserFeedback>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            name: BackendKind::SimpleRandom.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Table-driven dialog selection with personality influence".to_string(),
            capabilities: [
                "basic_dialog_selection",
                "personality_influence",
                "romance_dialog_support",
                "fallback_responses",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::dialogs::StatRange;
    use serde_json::json;

    fn dialogs() -> CharacterDialogs {
        let mut greeting = DialogEntry::new("click", &["Welcome back!"]);
        greeting.animation = Some("wave".to_string());
        let mut locked = DialogEntry::new("click", &["You're my favourite person."]);
        locked.requirements.insert(
            "affection".to_string(),
            StatRange {
                min: Some(80.0),
                max: None,
            },
        );
        CharacterDialogs {
            basic: vec![greeting],
            romance: vec![locked, DialogEntry::new("compliment", &["Only for you, darling."])],
        }
    }

    fn initialized(config: serde_json::Value, dialogs: &CharacterDialogs) -> FallbackBackend {
        let mut backend = FallbackBackend::new();
        backend.initialize(&config, dialogs).unwrap();
        backend
    }

    #[test]
    fn table_entries_win_over_builtins() {
        let mut backend = initialized(json!({ "seed": 1 }), &dialogs());
        let mut ctx = DialogContext::new("click");
        ctx.relationship_level = "Stranger".to_string();
        let response = backend.generate_response(&ctx).unwrap();
        assert_eq!(response.text, "Welcome back!");
        assert_eq!(response.animation, "wave");
        assert_eq!(response.confidence, 0.8);
        assert_eq!(response.response_type, "simple");
    }

    #[test]
    fn romance_preferred_once_gate_opens() {
        let mut backend = initialized(json!({ "seed": 1 }), &dialogs());
        let mut ctx = DialogContext::new("click");
        ctx.relationship_level = "Partner".to_string();

        // requirement not met: romance group is empty, basic is used
        assert_eq!(backend.generate_response(&ctx).unwrap().text, "Welcome back!");

        ctx.current_stats.insert("affection".to_string(), 90.0);
        let response = backend.generate_response(&ctx).unwrap();
        assert_eq!(response.text, "You're my favourite person.");
    }

    #[test]
    fn romance_not_preferred_when_disabled() {
        let mut backend = initialized(json!({ "preferRomanceDialogs": false }), &dialogs());
        let mut ctx = DialogContext::new("click");
        ctx.relationship_level = "Partner".to_string();
        ctx.current_stats.insert("affection".to_string(), 90.0);
        assert_eq!(backend.generate_response(&ctx).unwrap().text, "Welcome back!");
    }

    #[test]
    fn closed_gate_falls_back_to_builtin_lines() {
        let mut backend = FallbackBackend::new().with_gate(|_: &DialogEntry, _: &DialogContext| false);
        backend.initialize(&json!({ "seed": 2 }), &dialogs()).unwrap();
        let ctx = DialogContext::new("click");
        let response = backend.generate_response(&ctx).unwrap();
        let builtin = builtin_responses(&ctx).unwrap();
        assert!(builtin.contains(&response.text.as_str()));
    }

    #[test]
    fn builtin_lines_grow_with_personality() {
        let mut ctx = DialogContext::new("click");
        assert_eq!(builtin_responses(&ctx).unwrap().len(), 5);

        ctx.personality_traits.insert("shyness".to_string(), 0.9);
        ctx.personality_traits.insert("romanticism".to_string(), 0.9);
        ctx.relationship_level = "Friend".to_string();
        let lines = builtin_responses(&ctx).unwrap();
        assert!(lines.contains(&"H-hello... *blushes*"));
        assert!(lines.contains(&"Hello, my dear! 💕"));

        ctx.relationship_level = "Stranger".to_string();
        assert!(!builtin_responses(&ctx).unwrap().contains(&"Hello, my dear! 💕"));

        let mut gift = DialogContext::new("give_gift");
        gift.relationship_level = "Romantic Interest".to_string();
        assert_eq!(builtin_responses(&gift).unwrap().len(), 7);
        assert!(builtin_responses(&DialogContext::new("dance")).is_none());
    }

    #[test]
    fn personality_scoring() {
        let mut ctx = DialogContext::new("click");
        ctx.personality_traits.insert("shyness".to_string(), 1.0);
        assert_eq!(personality_score("Hi!", &ctx, 0.0), 1.0);
        assert!((personality_score("Hi!", &ctx, 1.0) - 0.8).abs() < 1e-9);
        assert!((personality_score("Hi!", &ctx, 0.5) - 0.9).abs() < 1e-9);
        assert_eq!(personality_score("hi", &ctx, 1.0), 1.0);

        let long = "one two three four five six seven eight nine ten eleven";
        assert!((personality_score(long, &ctx, 1.0) - 0.7).abs() < 1e-9);

        let mut ctx = DialogContext::new("click");
        ctx.personality_traits.insert("romanticism".to_string(), 1.0);
        assert!((personality_score("Hello, my Dear", &ctx, 0.5) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn unknown_trigger_fallback_order() {
        let ctx = DialogContext::new("dance");
        let mut backend = initialized(json!({ "fallbackResponses": ["configured line"] }), &CharacterDialogs::default());
        assert_eq!(backend.generate_response(&ctx).unwrap().text, "configured line");

        let mut backend = initialized(json!({}), &CharacterDialogs::default());
        let mut with_context = ctx.clone();
        with_context.fallback_responses = vec!["context line".to_string()];
        assert_eq!(backend.generate_response(&with_context).unwrap().text, "context line");

        let mut happy = ctx.clone();
        happy.current_mood = 95.0;
        assert_eq!(
            backend.generate_response(&happy).unwrap().text,
            "I'm feeling great today! 😄"
        );

        let mut partner = ctx;
        partner.relationship_level = "Partner".to_string();
        let response = backend.generate_response(&partner).unwrap();
        assert_eq!(response.text, "Hi sweetheart! I love you! 💖");
        assert_eq!(response.emotional_tone, "romantic");
        assert!((response.memory_importance - 0.9).abs() < 1e-9);
    }

    #[test]
    fn animation_precedence() {
        let mut ctx = DialogContext::new("rightclick");
        assert_eq!(FallbackBackend::select_animation("Hmm", None, &ctx), "thinking");
        assert_eq!(FallbackBackend::select_animation("Sorry", None, &ctx), "sad");
        ctx.fallback_animation = Some("idle".to_string());
        assert_eq!(FallbackBackend::select_animation("Sorry", None, &ctx), "idle");
        assert_eq!(
            FallbackBackend::select_animation("Sorry", Some("bow".to_string()), &ctx),
            "bow"
        );
    }

    #[test]
    fn seeded_selection_repeats() {
        let ctx = DialogContext::new("compliment");
        let mut a = initialized(json!({ "seed": 9 }), &CharacterDialogs::default());
        let mut b = initialized(json!({ "seed": 9 }), &CharacterDialogs::default());
        for _ in 0..10 {
            assert_eq!(
                a.generate_response(&ctx).unwrap().text,
                b.generate_response(&ctx).unwrap().text
            );
        }
    }

    #[test]
    fn always_handles_and_never_learns() {
        let mut backend = initialized(json!({}), &CharacterDialogs::default());
        let ctx = DialogContext::new("anything");
        assert!(backend.can_handle(&ctx));
        let feedback = UserFeedback {
            positive: true,
            engagement: 1.0,
        };
        assert!(backend
            .update_memory(&ctx, &DialogResponse::default(), Some(&feedback))
            .is_ok());
        assert_eq!(backend.describe().name, "simple_random");
    }

    #[test]
    fn invalid_config_rejected() {
        let mut backend = FallbackBackend::new();
        let err = backend
            .initialize(&json!({ "personalityInfluence": 3.0 }), &CharacterDialogs::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }
}
