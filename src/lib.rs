pub mod agent_engine;
pub mod config;
pub mod decoder;
pub mod device;
pub mod errors;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod perception;
pub mod planner;
pub mod reasoning;
pub mod registry;
pub mod verifier;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::agent_engine::runner::new_task_id;
use crate::agent_engine::state::TaskOutcome;
use crate::agent_engine::{AgentEngine, RunReport, Runner, RunnerConfig};
use crate::config::AppConfig;
use crate::errors::MobiClawResult;
use crate::knowledge::formatter::KnowledgeTemplates;
use crate::knowledge::local::LocalKnowledgeBase;
use crate::knowledge::KnowledgeSource;
use crate::llm::client::ModelHub;
use crate::llm::registry::ProviderRegistry;
use crate::llm::ModelSource;
use crate::planner::apps::AppResolver;
use crate::registry::{BuildContext, ComponentRegistry};

/// Mobile GUI automation agent.
#[derive(Parser, Debug)]
#[command(name = "mobiclaw", version, about)]
pub struct Cli {
    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(short, long, env = "MOBICLAW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Natural-language instruction for the agent
    #[arg(short, long)]
    pub task: String,

    /// Override `[runner] max_steps`
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Debug logging plus a per-run log file
    #[arg(short, long)]
    pub verbose: bool,
}

fn init_logging(verbose: bool, log_file: Option<&Path>) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file_layer = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::File::create(path).ok().map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed()
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

/// Knowledge source from `[knowledge]`, extra templates registered on top of the defaults.
pub fn build_knowledge(
    cfg: &AppConfig,
) -> MobiClawResult<(Option<Arc<dyn KnowledgeSource>>, KnowledgeTemplates)> {
    let mut templates = KnowledgeTemplates::default();
    let Some(kc) = &cfg.knowledge else {
        return Ok((None, templates));
    };
    for (category, template) in &kc.templates {
        templates.register(category.as_str(), template.as_str());
    }
    let base: Arc<dyn KnowledgeSource> = Arc::new(LocalKnowledgeBase::new(kc.local.clone())?);
    Ok((Some(base), templates))
}

/// Assemble engine and device from a validated config.
pub fn build_runner(
    cfg: &AppConfig,
    registry: &ComponentRegistry,
    models: &dyn ModelSource,
) -> MobiClawResult<Runner> {
    let (knowledge, templates) = build_knowledge(cfg)?;
    let ctx = BuildContext {
        registry,
        models,
        knowledge: knowledge.clone(),
        templates,
        apps: AppResolver::new(cfg.apps.clone(), cfg.env.platform.as_str(), cfg.env.language.as_str()),
    };

    let device = registry.device.build(&cfg.device, &ctx)?;

    let strategies = cfg
        .agent
        .perception
        .iter()
        .map(|p| registry.perception.build(p, &ctx))
        .collect::<MobiClawResult<Vec<_>>>()?;
    let memory = registry.memory.build(&cfg.agent.memory, &ctx)?;
    let reasoner = registry.reasoning.build(&cfg.agent.reasoning, &ctx)?;

    let mut engine = AgentEngine::new(strategies, reasoner, memory).with_verbose(cfg.agent.verbose);
    if let Some(p) = &cfg.agent.planner {
        engine = engine.with_planner(registry.planner.build(p, &ctx)?);
    }
    if let Some(v) = &cfg.agent.verifier {
        engine = engine.with_verifier(registry.verifier.build(v, &ctx)?);
    }
    tracing::info!(strategies = ?engine.strategy_names(), "agent assembled");

    let mut runner = Runner::new(engine, device, cfg.runner.clone());
    if let Some(k) = knowledge {
        runner = runner.with_knowledge(k);
    }
    Ok(runner)
}

fn execute(mut cfg: AppConfig, registry: &ComponentRegistry, cli: &Cli, task_id: &str) -> MobiClawResult<RunReport> {
    if let Some(n) = cli.max_steps {
        cfg.runner.max_steps = n;
    }

    // The core is synchronous and blocks on this runtime for model calls, so
    // it runs on the main thread rather than inside `block_on`.
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    let models = ModelHub::new(ProviderRegistry::from_config(&cfg.llm)?, runtime.handle().clone());
    let mut runner = build_runner(&cfg, registry, &models)?;

    let stop = Arc::new(AtomicBool::new(false));
    runner = runner.with_stop_flag(stop.clone());
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received; stopping after the current step");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let started = std::time::Instant::now();
    let report = runner.run(task_id, &cli.task)?;
    tracing::info!(
        outcome = ?report.outcome,
        steps = report.trajectory.len(),
        seconds = format!("{:.2}", started.elapsed().as_secs_f64()),
        "run complete"
    );
    Ok(report)
}

/// CLI entry point. Returns the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let registry = ComponentRegistry::with_builtins();
    let task_id = new_task_id();
    let loaded = config::load_config(cli.config.as_deref(), &registry);

    let log_file = cli.verbose.then(|| {
        let dir = match &loaded {
            Ok((_, cfg)) => cfg.runner.log_dir.clone(),
            Err(_) => RunnerConfig::default().log_dir,
        };
        dir.join(format!("run_{task_id}.log"))
    });
    init_logging(cli.verbose, log_file.as_deref());

    let outcome = loaded.and_then(|(path, cfg)| {
        tracing::info!(
            path = %path.display(),
            provider = %cfg.llm.active_provider,
            strategies = cfg.agent.perception.len(),
            device = %cfg.device.name,
            "config loaded"
        );
        execute(cfg, &registry, &cli, &task_id)
    });
    match outcome {
        Ok(report) if report.outcome == TaskOutcome::Done => 0,
        Ok(_) => 1,
        Err(e) => {
            tracing::error!(error = %e, "mobiclaw failed");
            2
        }
    }
}
