use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::ComponentConfig;
use crate::device::{connect_any, AndroidDevice, Device, HarmonyDevice, InputTiming, MockDevice, Platform};
use crate::errors::{MobiClawError, MobiClawResult};
use crate::knowledge::formatter::KnowledgeTemplates;
use crate::knowledge::KnowledgeSource;
use crate::llm::ModelSource;
use crate::memory::sliding_window::{SlidingWindowConfig, SlidingWindowMemory};
use crate::memory::summary::{SummaryConfig, SummaryMemory};
use crate::memory::Memory;
use crate::perception::compound::CompoundPerception;
use crate::perception::coordinate::CoordinatePerception;
use crate::perception::detector::{BoxDetectorClient, UiParserClient};
use crate::perception::grid::GridPerception;
use crate::perception::mock::MockPerception;
use crate::perception::som::SetOfMarksPerception;
use crate::perception::traits::Perception;
use crate::planner::apps::AppResolver;
use crate::planner::parsers::PlanParser;
use crate::planner::universal::{PlannerPreset, UniversalPlanner};
use crate::planner::Planner;
use crate::reasoning::universal::{load_template, InputMode, UniversalReasoner};
use crate::reasoning::Reasoner;
use crate::verifier::screen_diff::ScreenDiffVerifier;
use crate::verifier::Verifier;

pub const COMPOUND: &str = "compound";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Perception,
    Memory,
    Reasoning,
    Planner,
    Verifier,
    Device,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Perception => "perception",
            ComponentKind::Memory => "memory",
            ComponentKind::Reasoning => "reasoning",
            ComponentKind::Planner => "planner",
            ComponentKind::Verifier => "verifier",
            ComponentKind::Device => "device",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared collaborators handed to every factory.
pub struct BuildContext<'a> {
    pub registry: &'a ComponentRegistry,
    pub models: &'a dyn ModelSource,
    pub knowledge: Option<Arc<dyn KnowledgeSource>>,
    pub templates: KnowledgeTemplates,
    pub apps: AppResolver,
}

pub type Factory<T> = Box<dyn Fn(&ComponentConfig, &BuildContext<'_>) -> MobiClawResult<T> + Send + Sync>;

/// Named constructors for one component family.
pub struct FactoryTable<T> {
    kind: ComponentKind,
    factories: BTreeMap<String, Factory<T>>,
}

impl<T> FactoryTable<T> {
    fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ComponentConfig, &BuildContext<'_>) -> MobiClawResult<T> + Send + Sync + 'static,
    {
        if self.factories.insert(name.to_string(), Box::new(factory)).is_some() {
            tracing::warn!(kind = %self.kind, name = %name, "component registration overwritten");
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn validate(&self, name: &str) -> MobiClawResult<()> {
        self.get(name).map(|_| ())
    }

    fn get(&self, name: &str) -> MobiClawResult<&Factory<T>> {
        self.factories.get(name).ok_or_else(|| MobiClawError::UnknownComponent {
            kind: self.kind.to_string(),
            name: name.to_string(),
            registered: self.names().join(", "),
        })
    }

    pub fn build(&self, cfg: &ComponentConfig, ctx: &BuildContext<'_>) -> MobiClawResult<T> {
        let factory = self.get(&cfg.name)?;
        tracing::info!(kind = %self.kind, name = %cfg.name, "building component");
        factory(cfg, ctx)
    }
}

/// Startup-time map from (kind, name) to factory. Built once, passed by value
/// to the config loader and the agent builder.
pub struct ComponentRegistry {
    pub perception: FactoryTable<Box<dyn Perception>>,
    pub memory: FactoryTable<Box<dyn Memory>>,
    pub reasoning: FactoryTable<Box<dyn Reasoner>>,
    pub planner: FactoryTable<Box<dyn Planner>>,
    pub verifier: FactoryTable<Box<dyn Verifier>>,
    pub device: FactoryTable<Box<dyn Device>>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self {
            perception: FactoryTable::new(ComponentKind::Perception),
            memory: FactoryTable::new(ComponentKind::Memory),
            reasoning: FactoryTable::new(ComponentKind::Reasoning),
            planner: FactoryTable::new(ComponentKind::Planner),
            verifier: FactoryTable::new(ComponentKind::Verifier),
            device: FactoryTable::new(ComponentKind::Device),
        }
    }

    pub fn with_builtins() -> Self {
        let mut r = Self::empty();
        register_perception(&mut r.perception);
        register_memory(&mut r.memory);
        register_reasoning(&mut r.reasoning);
        register_planner(&mut r.planner);
        register_verifier(&mut r.verifier);
        register_device(&mut r.device);
        r
    }

    /// Name check that also descends into compound children.
    pub fn validate_perception(&self, cfg: &ComponentConfig) -> MobiClawResult<()> {
        self.perception.validate(&cfg.name)?;
        if cfg.name == COMPOUND {
            for child in cfg.children("children")? {
                self.validate_perception(&child)?;
            }
        }
        Ok(())
    }

    pub fn validate_memory(&self, cfg: &ComponentConfig) -> MobiClawResult<()> {
        self.memory.validate(&cfg.name)
    }

    pub fn validate_reasoning(&self, cfg: &ComponentConfig) -> MobiClawResult<()> {
        self.reasoning.validate(&cfg.name)
    }

    pub fn validate_planner(&self, cfg: &ComponentConfig) -> MobiClawResult<()> {
        self.planner.validate(&cfg.name)
    }

    pub fn validate_verifier(&self, cfg: &ComponentConfig) -> MobiClawResult<()> {
        self.verifier.validate(&cfg.name)
    }

    pub fn validate_device(&self, cfg: &ComponentConfig) -> MobiClawResult<()> {
        self.device.validate(&cfg.name)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ── Built-in factories ──────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(default)]
struct UiParserParams {
    url: String,
    box_threshold: f32,
    iou_threshold: f32,
    use_ocr: bool,
    timeout_secs: u64,
}

impl Default for UiParserParams {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/parse/".into(),
            box_threshold: 0.5,
            iou_threshold: 0.5,
            use_ocr: false,
            timeout_secs: 60,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct BoxDetectorParams {
    url: String,
    prompt: String,
    box_threshold: f32,
    text_threshold: f32,
    timeout_secs: u64,
}

impl Default for BoxDetectorParams {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8001/detect".into(),
            prompt: "button . icon . text . input field .".into(),
            box_threshold: 0.35,
            text_threshold: 0.25,
            timeout_secs: 60,
        }
    }
}

fn register_perception(t: &mut FactoryTable<Box<dyn Perception>>) {
    t.register("grid", |cfg, _| Ok(Box::new(GridPerception::new(cfg.name.as_str()))));
    t.register("mock_perception", |cfg, _| Ok(Box::new(MockPerception::new(cfg.name.as_str()))));
    t.register("omniparser", |cfg, _| {
        let p: UiParserParams = cfg.params_as()?;
        let client = UiParserClient::new(p.url, p.box_threshold, p.iou_threshold, p.use_ocr, p.timeout_secs)?;
        Ok(Box::new(CoordinatePerception::new(cfg.name.as_str(), Box::new(client))))
    });
    t.register("som_perception", |cfg, _| {
        let p: BoxDetectorParams = cfg.params_as()?;
        let client = BoxDetectorClient::new(p.url, p.prompt, p.box_threshold, p.text_threshold, p.timeout_secs)?;
        Ok(Box::new(SetOfMarksPerception::new(cfg.name.as_str(), Box::new(client))))
    });
    t.register(COMPOUND, |cfg, ctx| {
        let children = cfg
            .children("children")?
            .iter()
            .map(|child| ctx.registry.perception.build(child, ctx))
            .collect::<MobiClawResult<Vec<_>>>()?;
        if children.is_empty() {
            return Err(MobiClawError::Config("compound perception needs at least one child".into()));
        }
        Ok(Box::new(CompoundPerception::new(cfg.name.as_str(), children)))
    });
}

fn register_memory(t: &mut FactoryTable<Box<dyn Memory>>) {
    t.register("sliding_window", |cfg, ctx| {
        let params: SlidingWindowConfig = cfg.params_as()?;
        Ok(Box::new(SlidingWindowMemory::new(params, ctx.knowledge.clone(), ctx.templates.clone())))
    });
    t.register("summary_memory", |cfg, ctx| {
        let params: SummaryConfig = cfg.params_as()?;
        let model = ctx.models.model_for(cfg.role_or("summary"))?;
        Ok(Box::new(SummaryMemory::new(params, model, ctx.knowledge.clone(), ctx.templates.clone())))
    });
}

#[derive(Deserialize)]
#[serde(default)]
struct ReasoningParams {
    template: String,
    input_mode: InputMode,
}

impl Default for ReasoningParams {
    fn default() -> Self {
        Self {
            template: "general".into(),
            input_mode: InputMode::Image,
        }
    }
}

fn register_reasoning(t: &mut FactoryTable<Box<dyn Reasoner>>) {
    t.register("universal_reasoning", |cfg, ctx| {
        let p: ReasoningParams = cfg.params_as()?;
        let template = load_template(&p.template)?;
        let model = ctx.models.model_for(cfg.role_or("reasoning"))?;
        Ok(Box::new(UniversalReasoner::new(model, template, p.input_mode)))
    });
}

#[derive(Deserialize)]
#[serde(default)]
struct PlannerParams {
    preset: String,
    prompt_file: Option<PathBuf>,
    parser: Option<PlanParser>,
    use_knowledge: Option<bool>,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            preset: "manager_style".into(),
            prompt_file: None,
            parser: None,
            use_knowledge: None,
        }
    }
}

fn register_planner(t: &mut FactoryTable<Box<dyn Planner>>) {
    t.register("universal_planner", |cfg, ctx| {
        let p: PlannerParams = cfg.params_as()?;
        let preset = PlannerPreset::resolve(&p.preset, p.prompt_file.as_deref(), p.parser, p.use_knowledge)?;
        let model = ctx.models.model_for(cfg.role_or("planner"))?;
        Ok(Box::new(UniversalPlanner::new(model, preset, ctx.knowledge.clone(), ctx.apps.clone())))
    });
}

fn register_verifier(t: &mut FactoryTable<Box<dyn Verifier>>) {
    t.register("screen_diff", |cfg, _| {
        let threshold = cfg.param_f64("threshold").unwrap_or(0.01);
        Ok(Box::new(ScreenDiffVerifier::new(threshold)))
    });
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DeviceParams {
    serial: Option<String>,
    #[serde(flatten)]
    timing: InputTiming,
}

fn register_device(t: &mut FactoryTable<Box<dyn Device>>) {
    t.register("android_action", |cfg, _| {
        let p: DeviceParams = cfg.params_as()?;
        Ok(Box::new(AndroidDevice::connect(p.serial, p.timing)?))
    });
    t.register("harmony_action", |cfg, _| {
        let p: DeviceParams = cfg.params_as()?;
        Ok(Box::new(HarmonyDevice::connect(p.serial, p.timing)?))
    });
    t.register("auto", |cfg, ctx| {
        let p: DeviceParams = cfg.params_as()?;
        connect_any(p.serial.as_deref(), Platform::parse(ctx.apps.platform()), p.timing)
    });
    t.register("mock", |_, _| Ok(Box::new(MockDevice::new())));
}
