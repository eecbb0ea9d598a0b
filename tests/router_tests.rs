/// Router integration tests: a character configured from the JSON
/// fixture, fall-through between real backends, feedback learning, and
/// custom backends plugged in through the public trait.

use companion_dialog::core::backend::{BackendError, BackendKind, DialogBackend};
use companion_dialog::core::config::DialogBackendConfig;
use companion_dialog::core::fallback_backend::FallbackBackend;
use companion_dialog::core::markov_backend::{MarkovBackend, KNOWN_TRIGGERS};
use companion_dialog::core::router::{DialogRouter, RouterError, RouterState};
use companion_dialog::schema::context::{DialogContext, UserFeedback};
use companion_dialog::schema::dialogs::CharacterDialogs;
use companion_dialog::schema::response::{BackendInfo, DialogResponse};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const CHARACTER: &str = "tests/fixtures/character.json";
const CORPUS: &str = "tests/fixtures/companion_corpus.txt";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Character {
    dialog_backend: DialogBackendConfig,
    dialogs: CharacterDialogs,
    personality: HashMap<String, f64>,
}

fn load_character() -> Character {
    let text = std::fs::read_to_string(CHARACTER).unwrap();
    let character: Character = serde_json::from_str(&text).unwrap();
    character.dialog_backend.validate().unwrap();
    character
}

fn character_router(character: &Character) -> DialogRouter {
    let mut router = DialogRouter::from_config(&character.dialog_backend, &character.dialogs).unwrap();
    for line in std::fs::read_to_string(CORPUS).unwrap().lines() {
        router.train_text(line, "general");
    }
    router
}

fn context_for(character: &Character, trigger: &str) -> DialogContext {
    let mut ctx = DialogContext::new(trigger);
    ctx.personality_traits = character.personality.clone();
    ctx.relationship_level = "Friend".to_string();
    ctx
}

#[test]
fn fixture_character_builds_a_ready_router() {
    let character = load_character();
    let router = character_router(&character);

    assert_eq!(router.state(), RouterState::Ready);
    assert_eq!(router.default_backend(), Some("markov_chain"));
    assert_eq!(router.fallback_chain(), ["simple_random".to_string()]);
    assert!((router.threshold() - 0.4).abs() < 1e-9);
    assert_eq!(router.backend_names(), vec!["markov_chain", "simple_random"]);
}

#[test]
fn every_known_trigger_gets_a_response() {
    let character = load_character();
    let mut router = character_router(&character);

    for trigger in KNOWN_TRIGGERS {
        let response = router.generate(&context_for(&character, trigger)).unwrap();
        assert!(!response.text.is_empty(), "empty response for {trigger}");
        assert!((0.0..=1.0).contains(&response.confidence));
        assert!((0.0..=1.0).contains(&response.memory_importance));
        assert!(
            response.backend == "markov_chain" || response.backend == "simple_random",
            "unexpected backend {}",
            response.backend
        );
        assert!(!response.animation.is_empty());
    }
}

#[test]
fn seeded_configuration_is_reproducible() {
    let character = load_character();
    let mut a = character_router(&character);
    let mut b = character_router(&character);

    for trigger in ["click", "compliment", "give_gift", "hover"] {
        let ctx = context_for(&character, trigger);
        let first = a.generate(&ctx).unwrap();
        let second = b.generate(&ctx).unwrap();
        assert_eq!(first.text, second.text);
        assert_eq!(first.backend, second.backend);
    }
}

#[test]
fn unknown_backend_in_configuration_is_rejected() {
    let config = DialogBackendConfig::from_json(
        r#"{ "enabled": true, "defaultBackend": "llm", "fallbackChain": ["simple_random"] }"#,
    )
    .unwrap();
    let result = DialogRouter::from_config(&config, &CharacterDialogs::default());
    assert!(matches!(result, Err(RouterError::UnknownBackend(name)) if name == "llm"));
}

#[test]
fn invalid_backend_configuration_is_reported_by_name() {
    let config = DialogBackendConfig::from_json(
        r#"{
            "enabled": true,
            "defaultBackend": "markov_chain",
            "backends": { "markov_chain": { "minWords": 20, "maxWords": 5 } }
        }"#,
    )
    .unwrap();
    let result = DialogRouter::from_config(&config, &CharacterDialogs::default());
    match result {
        Err(RouterError::Backend { name, source }) => {
            assert_eq!(name, "markov_chain");
            assert!(matches!(source, BackendError::Config(_)));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("invalid word bounds accepted"),
    }
}

/// Every opening of this corpus is followed by "hate", so every candidate
/// trips the forbidden-word filter.
fn hateful_markov() -> Box<dyn DialogBackend> {
    let mut backend = MarkovBackend::new();
    backend
        .initialize(
            &json!({
                "chainOrder": 1,
                "minWords": 4,
                "maxWords": 8,
                "trainingData": [
                    "I hate rainy days and cold wet socks",
                    "We hate waiting around the old station alone",
                    "They hate loud trains early in the morning"
                ],
                "forbiddenWords": ["hate"],
                "seed": 3
            }),
            &CharacterDialogs::default(),
        )
        .unwrap();
    Box::new(backend)
}

fn fallback() -> Box<dyn DialogBackend> {
    let mut backend = FallbackBackend::new();
    backend
        .initialize(&json!({ "seed": 3 }), &CharacterDialogs::default())
        .unwrap();
    Box::new(backend)
}

#[test]
fn rejected_generation_substitutes_a_context_fallback() {
    let mut markov = hateful_markov();
    let mut ctx = DialogContext::new("click");
    ctx.fallback_responses = vec!["Let's talk about something nicer.".to_string()];

    let response = markov.generate_response(&ctx).unwrap();
    assert_eq!(response.text, "Let's talk about something nicer.");
    assert!((response.confidence - 0.3).abs() < 1e-9);
}

#[test]
fn low_confidence_fallback_falls_through_to_scripted_lines() {
    let mut router = DialogRouter::new();
    router.register(BackendKind::MarkovChain.name(), hateful_markov());
    router.register(BackendKind::SimpleRandom.name(), fallback());
    router.set_default("markov_chain").unwrap();
    router.set_fallback_chain(&["simple_random"]).unwrap();
    router.set_confidence_threshold(0.5);

    let response = router.generate(&DialogContext::new("click")).unwrap();
    assert_eq!(response.backend, "simple_random");
    assert!((response.confidence - 0.8).abs() < 1e-9);
    assert!(!response.text.to_lowercase().contains("hate"));

    router.set_confidence_threshold(0.2);
    let response = router.generate(&DialogContext::new("click")).unwrap();
    assert_eq!(response.backend, "markov_chain");
    assert_eq!(response.text, "I'm not sure what to say right now...");
}

#[test]
fn positive_feedback_teaches_the_generator() {
    let mut backend = MarkovBackend::new();
    backend
        .initialize(
            &json!({ "learningRate": 0.1, "adaptationSteps": 2, "seed": 1 }),
            &CharacterDialogs::default(),
        )
        .unwrap();

    let ctx = DialogContext::new("compliment");
    let response = DialogResponse {
        text: "Purple elephants dance under the bright silver moon".to_string(),
        ..Default::default()
    };
    let liked = UserFeedback {
        positive: true,
        engagement: 0.9,
    };
    let bored = UserFeedback {
        positive: true,
        engagement: 0.5,
    };

    backend.update_memory(&ctx, &response, Some(&bored)).unwrap();
    assert_eq!(backend.pending_feedback(), 0);

    backend.update_memory(&ctx, &response, Some(&liked)).unwrap();
    assert_eq!(backend.pending_feedback(), 1);
    assert!(!backend.global_chain().contains_state("Purple elephants"));

    backend.update_memory(&ctx, &response, Some(&liked)).unwrap();
    assert_eq!(backend.pending_feedback(), 0);
    assert!(backend.global_chain().contains_state("Purple elephants"));
}

#[test]
fn router_feedback_reaches_every_backend() {
    let character = load_character();
    let mut router = character_router(&character);
    let ctx = context_for(&character, "click");
    let response = router.generate(&ctx).unwrap();

    let feedback = UserFeedback {
        positive: true,
        engagement: 0.95,
    };
    router.update_memory(&ctx, &response, Some(&feedback)).unwrap();
    router.update_memory(&ctx, &response, None).unwrap();
}

/// A backend with a fixed answer, for routing tests.
struct Scripted {
    text: &'static str,
    confidence: f64,
}

impl DialogBackend for Scripted {
    fn initialize(
        &mut self,
        _config: &serde_json::Value,
        _dialogs: &CharacterDialogs,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate_response(&mut self, _context: &DialogContext) -> Result<DialogResponse, BackendError> {
        Ok(DialogResponse {
            text: self.text.to_string(),
            confidence: self.confidence,
            ..Default::default()
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
            name: "scripted".to_string(),
            version: "0.0.0".to_string(),
            description: "fixed response".to_string(),
            capabilities: Vec::new(),
        }
    }
}

fn scripted_router(threshold: f64) -> DialogRouter {
    let mut router = DialogRouter::new();
    router.register("shy", Box::new(Scripted { text: "um", confidence: 0.2 }));
    router.register("steady", Box::new(Scripted { text: "hello", confidence: 0.6 }));
    router.register("bold", Box::new(Scripted { text: "hey!", confidence: 0.9 }));
    router.set_default("shy").unwrap();
    router.set_fallback_chain(&["steady", "bold"]).unwrap();
    router.set_confidence_threshold(threshold);
    router
}

#[test]
fn first_backend_over_threshold_wins() {
    let mut router = scripted_router(0.5);
    let response = router.generate(&DialogContext::new("click")).unwrap();
    assert_eq!(response.backend, "steady");
    assert_eq!(response.text, "hello");
}

#[test]
fn best_response_is_kept_when_nothing_clears_the_threshold() {
    let mut router = scripted_router(0.95);
    let response = router.generate(&DialogContext::new("click")).unwrap();
    assert_eq!(response.backend, "bold");
    assert!((response.confidence - 0.9).abs() < 1e-9);
}

#[test]
fn unconfigured_router_cannot_generate() {
    let mut router = DialogRouter::new();
    assert_eq!(router.state(), RouterState::Uninitialized);
    assert!(matches!(
        router.generate(&DialogContext::new("click")),
        Err(RouterError::NoDefaultBackend)
    ));

    router.register("bold", Box::new(Scripted { text: "hey!", confidence: 0.9 }));
    assert!(matches!(
        router.set_default("missing"),
        Err(RouterError::UnknownBackend(_))
    ));
    router.set_default("bold").unwrap();
    assert_eq!(router.state(), RouterState::Configured);
}
