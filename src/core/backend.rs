/// The capability trait every dialog backend implements, and the closed
/// set of built-in backends.

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::fallback_backend::FallbackBackend;
use crate::core::markov_backend::MarkovBackend;
use crate::schema::context::{DialogContext, UserFeedback};
use crate::schema::dialogs::CharacterDialogs;
use crate::schema::response::{BackendInfo, DialogResponse};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("insufficient training data for trigger {trigger:?}")]
    InsufficientData { trigger: String },
    #[error("backend {backend} is not initialized")]
    NotInitialized { backend: String },
}

/// A source of dialog responses.
///
/// Backends own all of their mutable state, including their RNG, so a
/// router holding several of them needs nothing more than `&mut self`.
pub trait DialogBackend: Send {
    /// Parse and apply the backend's JSON configuration and train from the
    /// character's dialog tables. Failure leaves the backend unusable.
    fn initialize(
        &mut self,
        config: &serde_json::Value,
        dialogs: &CharacterDialogs,
    ) -> Result<(), BackendError>;

    fn generate_response(&mut self, context: &DialogContext) -> Result<DialogResponse, BackendError>;

    /// Cheap pre-check the router uses to skip a backend entirely.
    fn can_handle(&self, context: &DialogContext) -> bool;

    /// Report how a displayed response was received.
    fn update_memory(
        &mut self,
        context: &DialogContext,
        response: &DialogResponse,
        feedback: Option<&UserFeedback>,
    ) -> Result<(), BackendError>;

    fn describe(&self) -> BackendInfo;

    /// Feed extra training text after initialization. Backends that do not
    /// learn ignore it.
    fn train_text(&mut self, _text: &str, _trigger: &str) {}
}

/// Built-in backend implementations, addressable by configuration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    MarkovChain,
    SimpleRandom,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::MarkovChain, BackendKind::SimpleRandom];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::MarkovChain => "markov_chain",
            BackendKind::SimpleRandom => "simple_random",
        }
    }

    /// A fresh, uninitialized instance.
    pub fn build(self) -> Box<dyn DialogBackend> {
        match self {
            BackendKind::MarkovChain => Box::new(MarkovBackend::new()),
            BackendKind::SimpleRandom => Box::new(FallbackBackend::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_resolve_by_name() {
        assert_eq!(BackendKind::from_name("markov_chain"), Some(BackendKind::MarkovChain));
        assert_eq!(BackendKind::from_name("simple_random"), Some(BackendKind::SimpleRandom));
        assert_eq!(BackendKind::from_name("llm"), None);
    }

    #[test]
    fn built_backends_describe_their_kind() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.build().describe().name, kind.name());
        }
    }

    #[test]
    fn backends_are_send() {
        fn assert_send<T: Send + ?Sized>() {}
        assert_send::<dyn DialogBackend>();
    }
}
