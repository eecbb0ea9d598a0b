/// Backend registry and router: a default backend, an ordered fallback
/// chain and a confidence threshold.

use thiserror::Error;

use crate::core::backend::{BackendError, BackendKind, DialogBackend};
use crate::core::config::DialogBackendConfig;
use crate::schema::context::{DialogContext, UserFeedback};
use crate::schema::dialogs::CharacterDialogs;
use crate::schema::response::DialogResponse;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
    #[error("no default backend configured")]
    NoDefaultBackend,
    #[error("no backend produced a response (tried: {tried:?})")]
    AllBackendsFailed { tried: Vec<String> },
    #[error("backend {name} failed: {source}")]
    Backend {
        name: String,
        #[source]
        source: BackendError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Uninitialized,
    /// Default backend set.
    Configured,
    /// Default backend and fallback chain set.
    Ready,
}

const DEFAULT_THRESHOLD: f64 = 0.5;

pub struct DialogRouter {
    /// Insertion-ordered; names are unique.
    backends: Vec<(String, Box<dyn DialogBackend>)>,
    default_backend: Option<String>,
    fallback_chain: Vec<String>,
    chain_set: bool,
    confidence_threshold: f64,
}

impl Default for DialogRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogRouter {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            default_backend: None,
            fallback_chain: Vec::new(),
            chain_set: false,
            confidence_threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Build and initialize every backend the configuration names, then
    /// apply its default, fallback chain and threshold.
    pub fn from_config(
        config: &DialogBackendConfig,
        dialogs: &CharacterDialogs,
    ) -> Result<Self, RouterError> {
        let mut names: Vec<&str> = Vec::new();
        let mut configured: Vec<&String> = config.backends.keys().collect();
        configured.sort();
        let declared = std::iter::once(&config.default_backend)
            .chain(config.fallback_chain.iter())
            .chain(configured);
        for name in declared {
            if !name.is_empty() && !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }

        let mut router = Self::new();
        for name in names {
            let kind =
                BackendKind::from_name(name).ok_or_else(|| RouterError::UnknownBackend(name.to_string()))?;
            let mut backend = kind.build();
            backend
                .initialize(&config.backend_value(name), dialogs)
                .map_err(|source| RouterError::Backend {
                    name: name.to_string(),
                    source,
                })?;
            router.register(name, backend);
        }

        if !config.default_backend.is_empty() {
            router.set_default(&config.default_backend)?;
        }
        router.set_fallback_chain(config.fallback_chain.as_slice())?;
        router.set_confidence_threshold(config.confidence_threshold);
        Ok(router)
    }

    /// Add a backend. Re-registering a name replaces it in place.
    pub fn register(&mut self, name: &str, backend: Box<dyn DialogBackend>) {
        let info = backend.describe();
        match self.backends.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = backend,
            None => self.backends.push((name.to_string(), backend)),
        }
        tracing::info!(name, kind = %info.name, version = %info.version, "dialog backend registered");
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), RouterError> {
        self.ensure_registered(name)?;
        self.default_backend = Some(name.to_string());
        Ok(())
    }

    /// Replace the fallback chain. Nothing changes if any name is unknown.
    pub fn set_fallback_chain<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), RouterError> {
        for name in names {
            self.ensure_registered(name.as_ref())?;
        }
        self.fallback_chain = names.iter().map(|n| n.as_ref().to_string()).collect();
        self.chain_set = true;
        Ok(())
    }

    /// Clamped to 0..1.
    pub fn set_confidence_threshold(&mut self, threshold: f64) {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn state(&self) -> RouterState {
        match (&self.default_backend, self.chain_set) {
            (None, _) => RouterState::Uninitialized,
            (Some(_), false) => RouterState::Configured,
            (Some(_), true) => RouterState::Ready,
        }
    }

    pub fn default_backend(&self) -> Option<&str> {
        self.default_backend.as_deref()
    }

    pub fn fallback_chain(&self) -> &[String] {
        &self.fallback_chain
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn backend_mut(&mut self, name: &str) -> Option<&mut (dyn DialogBackend + 'static)> {
        self.backends
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_mut())
    }

    fn ensure_registered(&self, name: &str) -> Result<(), RouterError> {
        if self.backends.iter().any(|(n, _)| n == name) {
            Ok(())
        } else {
            Err(RouterError::UnknownBackend(name.to_string()))
        }
    }

    /// Try the default backend, then the fallback chain. The first response
    /// at or above the threshold wins; otherwise the most confident response
    /// seen is returned. Errors only when no backend produced anything.
    pub fn generate(&mut self, context: &DialogContext) -> Result<DialogResponse, RouterError> {
        let default = self.default_backend.clone().ok_or(RouterError::NoDefaultBackend)?;
        let order: Vec<String> = std::iter::once(default.clone())
            .chain(self.fallback_chain.iter().filter(|n| **n != default).cloned())
            .collect();
        let threshold = self.confidence_threshold;

        let mut best: Option<DialogResponse> = None;
        let mut tried = Vec::new();

        for name in order {
            let Some(backend) = self.backend_mut(&name) else {
                continue;
            };
            if !backend.can_handle(context) {
                tracing::debug!(backend = %name, trigger = %context.trigger, "backend cannot handle context");
                tried.push(format!("{name} (declined)"));
                continue;
            }

            let result = backend.generate_response(context);
            tried.push(name.clone());
            match result {
                Ok(mut response) => {
                    response.backend = name.clone();
                    if response.confidence >= threshold {
                        return Ok(response);
                    }
                    tracing::debug!(
                        backend = %name,
                        confidence = response.confidence,
                        threshold,
                        "response below threshold, falling through"
                    );
                    if best
                        .as_ref()
                        .map_or(true, |b| response.confidence > b.confidence)
                    {
                        best = Some(response);
                    }
                }
                Err(err) => {
                    tracing::warn!(backend = %name, error = %err, "backend failed, falling through");
                }
            }
        }

        best.ok_or(RouterError::AllBackendsFailed { tried })
    }

    /// Report feedback to every registered backend. All backends are
    /// visited; the first failure is returned.
    pub fn update_memory(
        &mut self,
        context: &DialogContext,
        response: &DialogResponse,
        feedback: Option<&UserFeedback>,
    ) -> Result<(), RouterError> {
        let mut first_error = None;
        for (name, backend) in &mut self.backends {
            if let Err(source) = backend.update_memory(context, response, feedback) {
                tracing::warn!(backend = %name, error = %source, "memory update failed");
                first_error.get_or_insert(RouterError::Backend {
                    name: name.clone(),
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Feed training text to every backend that learns.
    pub fn train_text(&mut self, text: &str, trigger: &str) {
        for (_, backend) in &mut self.backends {
            backend.train_text(text, trigger);
        }
    }
}
