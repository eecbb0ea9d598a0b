/// Chain integration tests: training from the fixture corpus, seeded
/// generation and RON persistence.

use companion_dialog::core::chain::{ChainError, MarkovChain};
use companion_dialog::core::markov_backend::clean_training_text;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

const CORPUS: &str = "tests/fixtures/companion_corpus.txt";

fn corpus_lines() -> Vec<String> {
    std::fs::read_to_string(CORPUS)
        .unwrap()
        .lines()
        .map(clean_training_text)
        .filter(|l| !l.is_empty())
        .collect()
}

fn trained(order: usize) -> MarkovChain {
    let mut chain = MarkovChain::new(order);
    for line in corpus_lines() {
        chain.train(&line);
    }
    chain
}

#[test]
fn corpus_trains_a_usable_chain() {
    let chain = trained(2);
    assert_eq!(chain.order(), 2);
    assert!(chain.has_enough_data());
    assert!(chain.state_count() > 100);
    // Several lines share an opening pair, so starters are fewer than lines.
    assert!(chain.starter_count() >= 2);
    assert!(chain.starter_count() < corpus_lines().len());
    assert!(chain.token_count("you") > 5);
}

#[test]
fn generation_opens_with_a_corpus_opening() {
    let chain = trained(2);
    let openings: Vec<String> = corpus_lines()
        .iter()
        .map(|l| l.split_whitespace().take(2).collect::<Vec<_>>().join(" "))
        .collect();

    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..20 {
        let (text, confidence) = chain.generate(10, 0.7, &mut rng);
        let opening = text.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        assert!(openings.contains(&opening), "unexpected opening: {text}");
        assert!(text.split_whitespace().count() <= 10);
        assert!((0.0..=0.8).contains(&confidence), "confidence {confidence}");
    }
}

#[test]
fn seeded_generation_is_reproducible() {
    let chain = trained(2);
    let run = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..5)
            .map(|_| chain.generate(12, 0.6, &mut rng).0)
            .collect::<Vec<_>>()
    };
    assert_eq!(run(99), run(99));
}

#[test]
fn greedy_generation_ignores_the_rng() {
    let chain = trained(1);
    let mut a = StdRng::seed_from_u64(1);
    let mut b = StdRng::seed_from_u64(2);
    assert_eq!(chain.generate(8, 0.0, &mut a), chain.generate(8, 0.0, &mut b));
}

#[test]
fn empty_chain_generates_nothing() {
    let chain = MarkovChain::new(2);
    let mut rng = StdRng::seed_from_u64(0);
    assert!(!chain.has_enough_data());
    assert_eq!(chain.generate(10, 0.5, &mut rng), (String::new(), 0.0));
}

#[test]
fn pruning_bounds_state_count_and_keeps_generating() {
    let mut chain = trained(2);
    let before = chain.state_count();
    let removed = chain.prune_to(40);
    assert_eq!(chain.state_count(), 40);
    assert_eq!(removed, before - 40);

    let mut rng = StdRng::seed_from_u64(3);
    let (text, _) = chain.generate(10, 0.5, &mut rng);
    assert!(!text.is_empty());
}

#[test]
fn saved_chain_reloads_with_identical_behavior() {
    let chain = trained(2);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("companion.ron");
    chain.save(&path).unwrap();

    let loaded = MarkovChain::load(&path).unwrap();
    assert_eq!(loaded.state_count(), chain.state_count());
    assert_eq!(loaded.starter_count(), chain.starter_count());
    assert_eq!(loaded.total_tokens(), chain.total_tokens());

    let mut a = StdRng::seed_from_u64(17);
    let mut b = StdRng::seed_from_u64(17);
    for _ in 0..5 {
        assert_eq!(chain.generate(12, 0.7, &mut a), loaded.generate(12, 0.7, &mut b));
    }
}

#[test]
fn loading_a_missing_snapshot_is_an_io_error() {
    let result = MarkovChain::load(Path::new("tests/fixtures/does_not_exist.ron"));
    assert!(matches!(result, Err(ChainError::Io(_))));
}
