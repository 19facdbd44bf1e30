use std::path::Path;

use crate::errors::MobiClawResult;
use crate::perception::types::{PerceptionMode, PerceptionResult};

/// Strategy trait for turning a screenshot into referenceable UI targets.
/// Implementations: coordinate (UI parser service), grid overlay, set-of-marks, compound.
///
/// `Ok(None)` means the adapter produced nothing usable; the agent treats it
/// like an error and falls back to the next configured strategy.
pub trait Perception: Send {
    fn name(&self) -> &str;

    fn mode(&self) -> PerceptionMode;

    fn perceive(
        &self,
        screenshot: &Path,
        width_hint: u32,
        height_hint: u32,
    ) -> MobiClawResult<Option<PerceptionResult>>;
}
