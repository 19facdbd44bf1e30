pub mod engine;
pub mod history;
pub mod loop_control;
pub mod runner;
pub mod state;

pub use engine::AgentEngine;
pub use runner::{RunReport, Runner, RunnerConfig};
