use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inclusive stat bounds an entry requires before it may trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl StatRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// A trigger → responses row from the character's dialog tables.
///
/// The engine does not interpret cooldowns or requirements itself; the
/// game-state collaborator decides availability through a `DialogGate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogEntry {
    pub trigger: String,
    pub responses: Vec<String>,
    #[serde(default)]
    pub animation: Option<String>,
    #[serde(default)]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub requirements: HashMap<String, StatRange>,
}

impl DialogEntry {
    pub fn new(trigger: &str, responses: &[&str]) -> Self {
        Self {
            trigger: trigger.to_string(),
            responses: responses.iter().map(|s| s.to_string()).collect(),
            animation: None,
            cooldown_secs: 0,
            requirements: HashMap::new(),
        }
    }

    /// True when every required stat is present and within range.
    pub fn requirements_met(&self, stats: &HashMap<String, f64>) -> bool {
        self.requirements
            .iter()
            .all(|(stat, range)| stats.get(stat).is_some_and(|v| range.contains(*v)))
    }
}

/// The character's existing dialog tables, basic and romance-specific.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterDialogs {
    #[serde(default)]
    pub basic: Vec<DialogEntry>,
    #[serde(default)]
    pub romance: Vec<DialogEntry>,
}

impl CharacterDialogs {
    pub fn is_empty(&self) -> bool {
        self.basic.is_empty() && self.romance.is_empty()
    }

    /// Every entry, basic first, then romance.
    pub fn entries(&self) -> impl Iterator<Item = &DialogEntry> {
        self.basic.iter().chain(self.romance.iter())
    }

    /// Distinct triggers in first-seen order.
    pub fn triggers(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entry in self.entries() {
            if !seen.contains(&entry.trigger) {
                seen.push(entry.trigger.clone());
            }
        }
        seen
    }
}
