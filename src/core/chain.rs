/// Order-N Markov chain over whitespace tokens: training, generation and persistence.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),
}

/// At or below this temperature selection is greedy.
pub const GREEDY_TEMPERATURE: f64 = 0.1;
/// Confidence multiplier applied every time generation restarts.
pub const RESTART_PENALTY: f64 = 0.9;
/// Confidence ceiling before frequency and restart scaling.
const BASE_CONFIDENCE: f64 = 0.8;
/// Relative token frequency is multiplied by this before capping at 1.0.
const FREQUENCY_SCALE: f64 = 10.0;
const MIN_STARTERS: usize = 2;
const MIN_STATES: usize = 10;

/// A trainable order-N Markov chain.
///
/// State keys are `order` consecutive tokens joined by a single space.
/// Options and starters keep first-observed order, with the count standing
/// in for repeated observations. Greedy ties therefore resolve to the
/// option that was observed first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkovChain {
    order: usize,
    /// State key → [(next_token, count)].
    transitions: FxHashMap<String, Vec<(String, u32)>>,
    /// [(state_key, count)] for keys that opened a training sample.
    starters: Vec<(String, u32)>,
    token_counts: FxHashMap<String, u32>,
    total_tokens: u64,
    /// State key → training tick at which it was last observed.
    reinforced: FxHashMap<String, u64>,
    training_tick: u64,
}

impl MarkovChain {
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(1),
            transitions: FxHashMap::default(),
            starters: Vec::new(),
            token_counts: FxHashMap::default(),
            total_tokens: 0,
            reinforced: FxHashMap::default(),
            training_tick: 0,
        }
    }

    /// Train on one text sample. Samples shorter than `order + 1` tokens
    /// are ignored.
    pub fn train(&mut self, text: &str) {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < self.order + 1 {
            return;
        }

        self.training_tick += 1;

        for token in &tokens {
            *self.token_counts.entry((*token).to_string()).or_default() += 1;
            self.total_tokens += 1;
        }

        for (i, window) in tokens.windows(self.order + 1).enumerate() {
            let key = window[..self.order].join(" ");
            let next = window[self.order];

            add_observation(self.transitions.entry(key.clone()).or_default(), next);
            self.reinforced.insert(key.clone(), self.training_tick);

            if i == 0 {
                add_observation(&mut self.starters, &key);
            }
        }
    }

    /// Generate up to `target_length` tokens.
    ///
    /// Walks the chain from a starter. On a dead end it stops if at least
    /// half the target was produced, otherwise restarts from a fresh
    /// starter and takes a confidence penalty. Returns the text and its
    /// confidence in 0..1.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        target_length: usize,
        temperature: f64,
        rng: &mut R,
    ) -> (String, f64) {
        if target_length == 0 {
            return (String::new(), 0.0);
        }
        let Some(start) = self.select_starter(temperature, rng) else {
            return (String::new(), 0.0);
        };

        let mut state: Vec<String> = split_key(start);
        let mut output: Vec<String> = state.clone();
        let mut penalty = 1.0;

        // safety limit on iterations
        for _ in 0..(target_length * 3) {
            if output.len() >= target_length {
                break;
            }

            let key = state.join(" ");
            let next = self
                .transitions
                .get(&key)
                .and_then(|options| sample_option(options, temperature, rng));

            match next {
                Some(token) => {
                    let token = token.to_string();
                    output.push(token.clone());
                    state.remove(0);
                    state.push(token);
                }
                None => {
                    if output.len() >= target_length / 2 {
                        break;
                    }
                    let Some(restart) = self.select_starter(temperature, rng) else {
                        break;
                    };
                    // the walk resumes from the new state; its tokens are not emitted
                    state = split_key(restart);
                    penalty *= RESTART_PENALTY;
                }
            }
        }

        output.truncate(target_length);
        let confidence = BASE_CONFIDENCE * penalty * self.frequency_confidence(&output);
        (output.join(" "), confidence)
    }

    /// Pick a starting state key. Greedy at low temperature, otherwise
    /// drawn in proportion to how often each key opened a sample.
    pub fn select_starter<R: Rng + ?Sized>(&self, temperature: f64, rng: &mut R) -> Option<&str> {
        sample_option(&self.starters, temperature, rng)
    }

    /// True once the chain has at least 2 distinct starters and 10 distinct states.
    pub fn has_enough_data(&self) -> bool {
        self.starters.len() >= MIN_STARTERS && self.transitions.len() >= MIN_STATES
    }

    /// Evict the least-reinforced states until at most `max_states` remain.
    ///
    /// Ordering: lowest total observation count, then oldest reinforcement,
    /// then key. Evicted keys also leave the starter list. Returns the
    /// number of states removed.
    pub fn prune_to(&mut self, max_states: usize) -> usize {
        if self.transitions.len() <= max_states {
            return 0;
        }

        let mut ranked: Vec<(u64, u64, String)> = self
            .transitions
            .iter()
            .map(|(key, options)| {
                let observations: u64 = options.iter().map(|(_, c)| u64::from(*c)).sum();
                let tick = self.reinforced.get(key).copied().unwrap_or(0);
                (observations, tick, key.clone())
            })
            .collect();
        ranked.sort();

        let excess = self.transitions.len() - max_states;
        for (_, _, key) in ranked.into_iter().take(excess) {
            self.transitions.remove(&key);
            self.reinforced.remove(&key);
            self.starters.retain(|(starter, _)| starter != &key);
        }

        tracing::debug!(evicted = excess, remaining = self.transitions.len(), "chain pruned");
        excess
    }

    fn frequency_confidence(&self, tokens: &[String]) -> f64 {
        if tokens.is_empty() || self.total_tokens == 0 {
            return 0.0;
        }
        let total = self.total_tokens as f64;
        let sum: f64 = tokens
            .iter()
            .map(|token| {
                let count = self.token_counts.get(token).copied().unwrap_or(0) as f64;
                (count / total * FREQUENCY_SCALE).min(1.0)
            })
            .sum();
        sum / tokens.len() as f64
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn starter_count(&self) -> usize {
        self.starters.len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn token_count(&self, token: &str) -> u32 {
        self.token_counts.get(token).copied().unwrap_or(0)
    }

    /// Observed next tokens for a state key, with counts.
    pub fn options(&self, key: &str) -> Option<&[(String, u32)]> {
        self.transitions.get(key).map(Vec::as_slice)
    }

    pub fn contains_state(&self, key: &str) -> bool {
        self.transitions.contains_key(key)
    }

    /// Monotonic counter bumped by every effective `train` call.
    pub fn last_trained(&self) -> u64 {
        self.training_tick
    }

    /// Save this chain to a RON file.
    pub fn save(&self, path: &Path) -> Result<(), ChainError> {
        let serialized = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load a chain from a RON file.
    pub fn load(path: &Path) -> Result<Self, ChainError> {
        let contents = std::fs::read_to_string(path)?;
        let chain: MarkovChain = ron::from_str(&contents)?;
        Ok(chain)
    }
}

/// Temperature-aware choice among counted options.
///
/// At or below [`GREEDY_TEMPERATURE`] the highest count wins, ties going
/// to the earliest option. Above it, each option is drawn with
/// probability proportional to its count.
pub fn sample_option<'a, R: Rng + ?Sized>(
    options: &'a [(String, u32)],
    temperature: f64,
    rng: &mut R,
) -> Option<&'a str> {
    if options.is_empty() {
        return None;
    }
    if options.len() == 1 || temperature <= GREEDY_TEMPERATURE {
        return most_frequent(options);
    }

    let dist = WeightedIndex::new(options.iter().map(|(_, count)| *count)).ok()?;
    Some(options[dist.sample(rng)].0.as_str())
}

fn most_frequent(options: &[(String, u32)]) -> Option<&str> {
    let mut best: Option<&(String, u32)> = None;
    for option in options {
        if best.map_or(true, |b| option.1 > b.1) {
            best = Some(option);
        }
    }
    best.map(|(token, _)| token.as_str())
}

/// Add one observation of `token`, incrementing its count.
fn add_observation(entries: &mut Vec<(String, u32)>, token: &str) {
    if let Some(entry) = entries.iter_mut().find(|(t, _)| t == token) {
        entry.1 += 1;
    } else {
        entries.push((token.to_string(), 1));
    }
}

fn split_key(key: &str) -> Vec<String> {
    key.split(' ').map(str::to_string).collect()
}
