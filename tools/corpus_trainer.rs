/// Corpus Trainer: trains a dialog chain from a text corpus and saves it as RON.
///
/// Usage: corpus_trainer --input <file.txt> --output <chain.ron> [--order <1-5>] [--sample <n>] [--seed <n>]
///
/// Each non-empty line of the input is one training sample.
use companion_dialog::core::chain::MarkovChain;
use companion_dialog::core::markov_backend::clean_training_text;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::env;
use std::path::Path;
use std::process;

const USAGE: &str =
    "Usage: corpus_trainer --input <file.txt> --output <chain.ron> [--order <1-5>] [--sample <n>] [--seed <n>]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut output = None;
    let mut order = 2usize;
    let mut sample = 0usize;
    let mut seed = 42u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" if i + 1 < args.len() => {
                i += 1;
                input = Some(args[i].clone());
            }
            "--output" if i + 1 < args.len() => {
                i += 1;
                output = Some(args[i].clone());
            }
            "--order" if i + 1 < args.len() => {
                i += 1;
                order = args[i].parse().unwrap_or_else(|_| {
                    eprintln!("Error: --order must be 1-5");
                    process::exit(1);
                });
            }
            "--sample" if i + 1 < args.len() => {
                i += 1;
                sample = args[i].parse().unwrap_or(0);
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{USAGE}");
                process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(input_path), Some(output_path)) = (input, output) else {
        eprintln!("Error: --input and --output are required");
        eprintln!("{USAGE}");
        process::exit(1);
    };

    if !(1..=5).contains(&order) {
        eprintln!("Error: --order must be 1-5");
        process::exit(1);
    }

    let text = std::fs::read_to_string(&input_path).unwrap_or_else(|e| {
        eprintln!("Error reading input file '{}': {}", input_path, e);
        process::exit(1);
    });

    println!("Training order-{} chain from '{}'...", order, input_path);
    let mut chain = MarkovChain::new(order);
    let mut used = 0usize;
    for line in text.lines() {
        let cleaned = clean_training_text(line);
        if cleaned.split_whitespace().count() > order {
            chain.train(&cleaned);
            used += 1;
        }
    }

    println!(
        "Chain trained: {} samples, {} states, {} starters, {} tokens",
        used,
        chain.state_count(),
        chain.starter_count(),
        chain.total_tokens()
    );
    if !chain.has_enough_data() {
        println!("Warning: chain needs at least 2 starters and 10 states to generate");
    }

    if sample > 0 {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..sample {
            let (line, confidence) = chain.generate(12, 0.7, &mut rng);
            println!("  [{:.2}] {}", confidence, line);
        }
    }

    chain.save(Path::new(&output_path)).unwrap_or_else(|e| {
        eprintln!("Error saving chain to '{}': {}", output_path, e);
        process::exit(1);
    });

    println!("Chain saved to '{}'", output_path);
}
