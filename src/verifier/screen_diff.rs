use std::path::Path;

use crate::agent_engine::state::Action;
use crate::errors::MobiClawResult;
use crate::verifier::{Verifier, VerifierResult};

/// Per-pixel grayscale difference above which a pixel counts as changed.
const PIXEL_DELTA: u8 = 30;

/// Compares grayscale before/after screenshots and succeeds when more than
/// `threshold` of the pixels changed.
pub struct ScreenDiffVerifier {
    threshold: f64,
}

impl ScreenDiffVerifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for ScreenDiffVerifier {
    fn default() -> Self {
        Self::new(0.01)
    }
}

enum Diff {
    DimensionChanged,
    Ratio(f64),
}

fn diff_ratio(before: &Path, after: &Path) -> MobiClawResult<Diff> {
    let a = image::open(before)?.to_luma8();
    let b = image::open(after)?.to_luma8();
    if a.dimensions() != b.dimensions() {
        return Ok(Diff::DimensionChanged);
    }

    let changed = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .filter(|(p, q)| p.abs_diff(**q) > PIXEL_DELTA)
        .count();
    let total = (a.width() as u64 * a.height() as u64).max(1);
    Ok(Diff::Ratio(changed as f64 / total as f64))
}

impl Verifier for ScreenDiffVerifier {
    fn verify(&self, action: &Action, before: &Path, after: &Path) -> VerifierResult {
        if !action.kind.is_observable() {
            return VerifierResult::success("Action type skipped verification");
        }

        let ratio = match diff_ratio(before, after) {
            Ok(Diff::Ratio(r)) => r,
            Ok(Diff::DimensionChanged) => return VerifierResult::success("Screen dimension changed"),
            Err(e) => {
                tracing::error!(error = %e, "verification failed");
                return VerifierResult::success(format!("Verifier Error: {e}"));
            }
        };

        tracing::info!(diff_ratio = format!("{ratio:.4}"), "screen diff");

        if ratio > self.threshold {
            VerifierResult {
                is_success: true,
                feedback: format!("Screen changed (Diff: {:.2}%)", ratio * 100.0),
                score: 1.0,
                should_retry: false,
            }
        } else {
            VerifierResult {
                is_success: false,
                feedback: format!("Screen did NOT change (Diff: {:.2}%)", ratio * 100.0),
                score: 0.0,
                should_retry: true,
            }
        }
    }
}
