use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// The value handed back to the character layer. The caller applies the
/// animation, persists memory, and decides whether to use the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogResponse {
    pub text: String,
    pub animation: String,
    /// 0..1
    pub confidence: f64,
    /// "romantic", "casual", "emotional", "general" or "simple".
    pub response_type: String,
    pub emotional_tone: String,
    #[serde(default)]
    pub topics: FxHashSet<String>,
    /// 0..1
    pub memory_importance: f64,
    pub learning_value: f64,
    /// Name of the backend that produced this response. Filled in by the router.
    #[serde(default)]
    pub backend: String,
}

/// Static metadata describing a backend implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: Vec<String>,
}

impl BackendInfo {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
