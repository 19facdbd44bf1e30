pub mod annotator;
pub mod compound;
pub mod coordinate;
pub mod detector;
pub mod glyphs;
pub mod grid;
pub mod mock;
pub mod screenshot;
pub mod som;
pub mod traits;
pub mod types;

pub use traits::Perception;
pub use types::{ElementType, GridSpec, PerceptionMeta, PerceptionMode, PerceptionResult, UIElement};
