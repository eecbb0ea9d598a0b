/// Preview: interactive dialog shell for testing a character's backend setup.
///
/// Usage: preview --character <character.json> [--seed <n>]
///
/// The character file holds a `dialogBackend` block, optional `dialogs`
/// tables and optional starting `personality` traits. Any `trainingFiles`
/// listed by the markov_chain backend are read relative to the character
/// file and fed to the router one line at a time.
///
/// Commands:
///   say <trigger>             generate a response for a trigger
///   mood <0-100>              set current mood
///   relationship <level>      set relationship level
///   trait <name> <0-1>        set a personality trait weight
///   stat <name> <value>       set a current stat
///   feedback <good|bad> [e]   report feedback on the last response
///   bulk <trigger> <n>        generate n responses with variety stats
///   backends                  list registered backends
///   help                      list commands
///   quit                      exit

use companion_dialog::core::backend::BackendKind;
use companion_dialog::core::config::{DialogBackendConfig, MarkovConfig};
use companion_dialog::core::markov_backend::KNOWN_TRIGGERS;
use companion_dialog::core::router::DialogRouter;
use companion_dialog::schema::context::{DialogContext, InteractionRecord, UserFeedback};
use companion_dialog::schema::dialogs::CharacterDialogs;
use companion_dialog::schema::response::DialogResponse;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const HISTORY_LIMIT: usize = 10;
const TRAINING_TRIGGER: &str = "general";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterFile {
    dialog_backend: DialogBackendConfig,
    #[serde(default)]
    dialogs: CharacterDialogs,
    #[serde(default)]
    personality: HashMap<String, f64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut character_path = None;
    let mut seed: u64 = 42;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--character" if i + 1 < args.len() => {
                i += 1;
                character_path = Some(PathBuf::from(&args[i]));
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(character_path) = character_path else {
        eprintln!("Error: --character is required");
        print_usage();
        std::process::exit(1);
    };

    let character = load_character(&character_path).unwrap_or_else(|e| {
        eprintln!("Error loading character '{}': {}", character_path.display(), e);
        std::process::exit(1);
    });

    let mut router = build_router(&character, &character_path, seed).unwrap_or_else(|e| {
        eprintln!("Error building router: {}", e);
        std::process::exit(1);
    });

    let mut context = DialogContext::new("");
    context.personality_traits = character.personality.clone();
    context.relationship_level = "Stranger".to_string();
    let mut last: Option<(DialogContext, DialogResponse)> = None;

    println!(
        "Router ready: default={} chain={:?} threshold={:.2}",
        router.default_backend().unwrap_or("none"),
        router.fallback_chain(),
        router.threshold()
    );
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    loop {
        print!("preview> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            continue;
        };

        match command {
            "quit" | "exit" | "q" => break,
            "help" | "h" | "?" => print_help(),
            "say" => {
                let Some(trigger) = parts.get(1) else {
                    println!("Usage: say <trigger>");
                    continue;
                };
                let mut ctx = context.clone();
                ctx.trigger = trigger.to_string();
                match router.generate(&ctx) {
                    Ok(response) => {
                        print_response(&response);
                        remember(&mut context, &ctx.trigger, &response.text);
                        last = Some((ctx, response));
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "mood" => match parts.get(1).and_then(|v| v.parse::<f64>().ok()) {
                Some(mood) => {
                    context.current_mood = mood.clamp(0.0, 100.0);
                    println!("Mood set to {}", context.current_mood);
                }
                None => println!("Usage: mood <0-100> (current: {})", context.current_mood),
            },
            "relationship" => {
                if parts.len() < 2 {
                    println!("Usage: relationship <level> (current: {})", context.relationship_level);
                    continue;
                }
                context.relationship_level = parts[1..].join(" ");
                println!("Relationship set to '{}'", context.relationship_level);
            }
            "trait" => match (parts.get(1), parts.get(2).and_then(|v| v.parse::<f64>().ok())) {
                (Some(name), Some(weight)) => {
                    context
                        .personality_traits
                        .insert(name.to_string(), weight.clamp(0.0, 1.0));
                    println!("Trait '{}' set to {}", name, weight.clamp(0.0, 1.0));
                }
                _ => {
                    println!("Usage: trait <name> <0-1>");
                    let mut traits: Vec<_> = context.personality_traits.iter().collect();
                    traits.sort_by(|a, b| a.0.cmp(b.0));
                    for (name, weight) in traits {
                        println!("    {} = {:.2}", name, weight);
                    }
                }
            },
            "stat" => match (parts.get(1), parts.get(2).and_then(|v| v.parse::<f64>().ok())) {
                (Some(name), Some(value)) => {
                    context.current_stats.insert(name.to_string(), value);
                    println!("Stat '{}' set to {}", name, value);
                }
                _ => println!("Usage: stat <name> <value>"),
            },
            "feedback" => {
                let positive = match parts.get(1) {
                    Some(&"good") | Some(&"+") => true,
                    Some(&"bad") | Some(&"-") => false,
                    _ => {
                        println!("Usage: feedback <good|bad> [engagement 0-1]");
                        continue;
                    }
                };
                let engagement = parts
                    .get(2)
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(if positive { 0.8 } else { 0.2 });
                let Some((ctx, response)) = last.as_ref() else {
                    println!("No response to give feedback on yet.");
                    continue;
                };
                let feedback = UserFeedback {
                    positive,
                    engagement: engagement.clamp(0.0, 1.0),
                };
                match router.update_memory(ctx, response, Some(&feedback)) {
                    Ok(()) => println!("Feedback recorded."),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "bulk" => {
                let (Some(trigger), Some(count)) = (
                    parts.get(1),
                    parts.get(2).and_then(|v| v.parse::<usize>().ok()).filter(|n| *n > 0),
                ) else {
                    println!("Usage: bulk <trigger> <n>");
                    continue;
                };
                run_bulk(&mut router, &context, trigger, count);
            }
            "backends" => {
                for name in router.backend_names() {
                    let marker = if Some(name) == router.default_backend() { "*" } else { " " };
                    println!("  {} {}", marker, name);
                }
            }
            other => println!("Unknown command: {}. Type 'help' for commands.", other),
        }
    }
}

fn load_character(path: &Path) -> Result<CharacterFile, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let character: CharacterFile = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    character.dialog_backend.validate().map_err(|e| e.to_string())?;
    Ok(character)
}

/// Seeds every configured backend that has no explicit seed, builds the
/// router and feeds it the markov backend's training files.
fn build_router(
    character: &CharacterFile,
    character_path: &Path,
    seed: u64,
) -> Result<DialogRouter, String> {
    let mut config = character.dialog_backend.clone();
    let mut names: Vec<String> = config.fallback_chain.clone();
    names.push(config.default_backend.clone());
    for name in names.into_iter().filter(|n| !n.is_empty()) {
        let value = config
            .backends
            .entry(name)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(object) = value.as_object_mut() {
            object.entry("seed").or_insert_with(|| serde_json::json!(seed));
        }
    }

    let mut router = DialogRouter::from_config(&config, &character.dialogs).map_err(|e| e.to_string())?;

    let markov_name = BackendKind::MarkovChain.name();
    if config.backends.contains_key(markov_name) {
        let markov = MarkovConfig::from_value(config.backend_value(markov_name)).map_err(|e| e.to_string())?;
        let base = character_path.parent().unwrap_or_else(|| Path::new("."));
        for file in &markov.training_files {
            let path = base.join(file);
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("training file '{}': {}", path.display(), e))?;
            let mut lines = 0usize;
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                router.train_text(line, TRAINING_TRIGGER);
                lines += 1;
            }
            println!("Trained on {} lines from '{}'", lines, path.display());
        }
    }

    Ok(router)
}

fn remember(context: &mut DialogContext, trigger: &str, text: &str) {
    context.interaction_history.insert(
        0,
        InteractionRecord {
            trigger: trigger.to_string(),
            response: text.to_string(),
            timestamp: context.timestamp,
        },
    );
    context.interaction_history.truncate(HISTORY_LIMIT);
    context.timestamp += 1;
    context.extension.conversation_turn += 1;
}

fn print_response(response: &DialogResponse) {
    println!("\n--- {} ({:.2}) ---", response.backend, response.confidence);
    println!("{}", response.text);
    let mut topics: Vec<&String> = response.topics.iter().collect();
    topics.sort();
    println!(
        "animation={} type={} tone={} topics={:?} importance={:.2}",
        response.animation, response.response_type, response.emotional_tone, topics, response.memory_importance
    );
    println!("--- End ---\n");
}

fn run_bulk(router: &mut DialogRouter, context: &DialogContext, trigger: &str, count: usize) {
    let mut ctx = context.clone();
    ctx.trigger = trigger.to_string();

    let mut texts = Vec::new();
    let mut by_backend: HashMap<String, usize> = HashMap::new();
    let mut confidence_sum = 0.0;
    let mut errors = 0;

    for _ in 0..count {
        match router.generate(&ctx) {
            Ok(response) => {
                *by_backend.entry(response.backend.clone()).or_insert(0) += 1;
                confidence_sum += response.confidence;
                remember(&mut ctx, trigger, &response.text);
                texts.push(response.text);
            }
            Err(_) => errors += 1,
        }
    }

    println!("\n=== Bulk Generation: {} responses ({} errors) ===\n", texts.len(), errors);
    if texts.is_empty() {
        return;
    }

    let unique: FxHashSet<&String> = texts.iter().collect();
    println!(
        "Unique responses: {}/{} ({:.0}%)",
        unique.len(),
        texts.len(),
        unique.len() as f64 / texts.len() as f64 * 100.0
    );
    println!("Mean confidence: {:.2}", confidence_sum / texts.len() as f64);

    let mut backends: Vec<_> = by_backend.into_iter().collect();
    backends.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (name, n) in backends {
        println!("  {:<16} {}", name, n);
    }

    println!("\nSamples:");
    for text in texts.iter().take(5) {
        println!("  {}", text);
    }
    println!();
}

fn print_usage() {
    println!("Usage: preview --character <character.json> [--seed <n>]");
    println!();
    println!("Interactive dialog shell. Loads the character's dialogBackend");
    println!("configuration and dialog tables, then generates responses.");
    println!("Set RUST_LOG=debug to see per-attempt scoring.");
}

fn print_help() {
    println!("Commands:");
    println!("  say <trigger>             Generate a response for a trigger");
    println!("  mood <0-100>              Set current mood");
    println!("  relationship <level>      Set relationship level");
    println!("  trait <name> <0-1>        Set a personality trait weight");
    println!("  stat <name> <value>       Set a current stat");
    println!("  feedback <good|bad> [e]   Report feedback on the last response");
    println!("  bulk <trigger> <n>        Generate n responses with variety statistics");
    println!("  backends                  List registered backends");
    println!("  help                      Show this help");
    println!("  quit                      Exit");
    println!();
    println!("Triggers: {}", KNOWN_TRIGGERS.join(", "));
}
