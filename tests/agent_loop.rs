use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mobiclaw_lib::agent_engine::state::{Action, ActionType, TaskOutcome};
use mobiclaw_lib::agent_engine::{AgentEngine, Runner, RunnerConfig};
use mobiclaw_lib::device::MockDevice;
use mobiclaw_lib::errors::{MobiClawError, MobiClawResult};
use mobiclaw_lib::knowledge::formatter::KnowledgeTemplates;
use mobiclaw_lib::knowledge::local::{LocalKnowledgeBase, LocalKnowledgeConfig};
use mobiclaw_lib::knowledge::KnowledgeSource;
use mobiclaw_lib::memory::sliding_window::{SlidingWindowConfig, SlidingWindowMemory};
use mobiclaw_lib::memory::{FragmentKind, Memory, MemoryFragment};
use mobiclaw_lib::perception::mock::MockPerception;
use mobiclaw_lib::perception::traits::Perception;
use mobiclaw_lib::perception::types::{PerceptionMode, PerceptionResult};
use mobiclaw_lib::reasoning::Reasoner;
use mobiclaw_lib::verifier::{Verifier, VerifierResult};

struct Scripted {
    actions: Mutex<VecDeque<Action>>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(actions: Vec<Action>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                actions: Mutex::new(actions.into()),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl Reasoner for Scripted {
    fn think(
        &self,
        _task: &str,
        _plan: &str,
        _perception: &PerceptionResult,
        _context: &[MemoryFragment],
    ) -> MobiClawResult<(Action, String)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let action = self
            .actions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Action::new(ActionType::Done));
        Ok((action, "{}".into()))
    }
}

struct AlwaysDown(Arc<AtomicUsize>);

impl Perception for AlwaysDown {
    fn name(&self) -> &str {
        "down"
    }
    fn mode(&self) -> PerceptionMode {
        PerceptionMode::Coordinate
    }
    fn perceive(&self, _: &Path, _: u32, _: u32) -> MobiClawResult<Option<PerceptionResult>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(MobiClawError::Perception("service unavailable".into()))
    }
}

struct ScriptedVerifier(Mutex<VecDeque<bool>>);

impl Verifier for ScriptedVerifier {
    fn verify(&self, _: &Action, _: &Path, _: &Path) -> VerifierResult {
        let ok = self.0.lock().unwrap().pop_front().unwrap_or(true);
        VerifierResult {
            is_success: ok,
            feedback: if ok { "changed".into() } else { "unchanged".into() },
            score: if ok { 1.0 } else { 0.0 },
            should_retry: !ok,
        }
    }
}

fn memory(knowledge: Option<Arc<dyn KnowledgeSource>>) -> Box<dyn Memory> {
    Box::new(SlidingWindowMemory::new(
        SlidingWindowConfig::default(),
        knowledge,
        KnowledgeTemplates::default(),
    ))
}

fn white_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(64, 128, image::Rgb([255, 255, 255]))
        .save(&path)
        .unwrap();
    path
}

#[test]
fn every_failing_strategy_is_tried_exactly_once() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let strategies: Vec<Box<dyn Perception>> = (0..4)
        .map(|_| Box::new(AlwaysDown(attempts.clone())) as Box<dyn Perception>)
        .collect();
    let (reasoner, calls) = Scripted::new(vec![]);
    let mut engine = AgentEngine::new(strategies, Box::new(reasoner), memory(None));

    engine.reset("open the camera");
    let action = engine.step(Path::new("missing.png"), 1080, 2340);

    assert_eq!(action.kind, ActionType::Fail);
    assert!(action
        .thought
        .as_deref()
        .unwrap_or_default()
        .contains("service unavailable"));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_verification_switches_strategy_and_success_switches_back() {
    let dir = tempfile::tempdir().unwrap();
    let shot = white_png(dir.path(), "s.png");

    let (reasoner, _) = Scripted::new(vec![Action::tap(5, 5), Action::tap(6, 6), Action::tap(7, 7)]);
    let verifier = ScriptedVerifier(Mutex::new(VecDeque::from([false, true])));
    let mut engine = AgentEngine::new(
        vec![Box::new(MockPerception::new("primary")), Box::new(MockPerception::new("backup"))],
        Box::new(reasoner),
        memory(None),
    )
    .with_verifier(Box::new(verifier));

    engine.reset("toggle wifi");
    engine.step(&shot, 64, 128);
    assert_eq!(engine.runtime_state().current_strategy_idx, 0);

    engine.step(&shot, 64, 128);
    assert_eq!(engine.runtime_state().current_strategy_idx, 1);
    let errors: Vec<_> = engine
        .memory()
        .working_context()
        .into_iter()
        .filter(|f| f.kind == FragmentKind::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].content_text().contains("unchanged"));

    engine.step(&shot, 64, 128);
    assert_eq!(engine.runtime_state().current_strategy_idx, 0);
}

#[test]
fn successful_run_stores_traces_that_feed_the_fast_path() {
    let dir = tempfile::tempdir().unwrap();
    let knowledge: Arc<dyn KnowledgeSource> = Arc::new(
        LocalKnowledgeBase::new(LocalKnowledgeConfig {
            traces_path: Some(dir.path().join("traces.jsonl")),
            ..LocalKnowledgeConfig::default()
        })
        .unwrap(),
    );

    let (reasoner, _) = Scripted::new(vec![Action::tap(10, 20), Action::new(ActionType::Done)]);
    let engine = AgentEngine::new(
        vec![Box::new(MockPerception::new("mock"))],
        Box::new(reasoner),
        memory(Some(knowledge.clone())),
    );
    let config = RunnerConfig {
        max_steps: 5,
        screenshot_dir: dir.path().join("shots"),
        session_dir: Some(dir.path().join("sessions")),
        settle_ms: 0,
        wait_ms: 0,
        post_action_ms: 0,
        ..RunnerConfig::default()
    };
    let mut runner = Runner::new(engine, Box::new(MockDevice::new()), config).with_knowledge(knowledge.clone());

    let report = runner.run("1700000000", "Open Settings").unwrap();
    assert_eq!(report.outcome, TaskOutcome::Done);
    assert_eq!(report.trajectory.len(), 2);
    assert!(dir.path().join("shots").join("task_1700000000_step_1.png").exists());

    let session = std::fs::read_to_string(dir.path().join("sessions").join("session_1700000000.jsonl")).unwrap();
    assert_eq!(session.lines().count(), 4);

    // A fresh agent on the same screen and task replays the stored tap without reasoning.
    let (reasoner, calls) = Scripted::new(vec![]);
    let mut engine = AgentEngine::new(
        vec![Box::new(MockPerception::new("mock"))],
        Box::new(reasoner),
        memory(Some(knowledge)),
    );
    engine.reset("open settings");
    let action = engine.step(&report.trajectory[0].screenshot_path, 1080, 2340);

    assert_eq!(action.kind, ActionType::Tap);
    assert_eq!(action.param_i64("x"), Some(10));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let cached = engine
        .memory()
        .working_context()
        .into_iter()
        .any(|f| f.metadata.get("source").and_then(|v| v.as_str()) == Some("memory_cache"));
    assert!(cached);
}

#[test]
fn stop_flag_cancels_before_the_first_step() {
    let dir = tempfile::tempdir().unwrap();
    let (reasoner, calls) = Scripted::new(vec![]);
    let engine = AgentEngine::new(vec![Box::new(MockPerception::new("mock"))], Box::new(reasoner), memory(None));
    let runner_cfg = RunnerConfig {
        screenshot_dir: dir.path().join("shots"),
        session_dir: Some(dir.path().to_path_buf()),
        ..RunnerConfig::default()
    };
    let mut runner = Runner::new(engine, Box::new(MockDevice::new()), runner_cfg);
    runner.stop_flag().store(true, Ordering::SeqCst);

    let report = runner.run("7", "anything").unwrap();
    assert_eq!(report.outcome, TaskOutcome::Cancelled);
    assert!(report.trajectory.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
