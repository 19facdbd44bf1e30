pub mod screen_diff;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::Action;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierResult {
    pub is_success: bool,
    pub feedback: String,
    pub score: f32,
    pub should_retry: bool,
}

impl VerifierResult {
    pub fn success(feedback: impl Into<String>) -> Self {
        Self {
            is_success: true,
            feedback: feedback.into(),
            score: 0.0,
            should_retry: false,
        }
    }
}

/// Judges whether the previous action had an observable effect.
///
/// Verification is advisory: implementations report internal problems as a
/// successful result with explanatory feedback instead of failing.
pub trait Verifier: Send {
    fn verify(&self, action: &Action, before: &Path, after: &Path) -> VerifierResult;
}
