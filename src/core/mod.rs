pub mod analysis;
pub mod backend;
pub mod chain;
pub mod config;
pub mod fallback_backend;
pub mod markov_backend;
pub mod quality;
pub mod router;
