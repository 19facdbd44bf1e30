pub mod client;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod types;

use std::path::PathBuf;

/// What the agent core needs from a language model.
///
/// Returns an empty string on any failure; callers treat empty output as
/// "the model had nothing to say" rather than an error.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str, images: &[PathBuf]) -> String;
}

/// Hands out a language model for a named agent role
/// (`reasoning`, `planner`, `summary`).
pub trait ModelSource: Send + Sync {
    fn model_for(&self, role: &str) -> crate::errors::MobiClawResult<std::sync::Arc<dyn LanguageModel>>;
}
