use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::agent_engine::runner::RunnerConfig;
use crate::errors::{MobiClawError, MobiClawResult};
use crate::knowledge::local::LocalKnowledgeConfig;
use crate::registry::ComponentRegistry;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub device: ComponentConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub knowledge: Option<KnowledgeConfig>,
    #[serde(default)]
    pub env: EnvConfig,
    /// App alias → `{ <platform>_<lang> = name, package_<platform> = id }`.
    #[serde(default)]
    pub apps: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var MOBICLAW_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Maps agent roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Decides the next UI action; usually a vision model.
    pub reasoning: Option<RoleEntry>,
    /// Turns the task into a plan once per run.
    pub planner: Option<RoleEntry>,
    /// Compresses old history for the summary memory.
    pub summary: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// A registry component selected by name with free-form parameters.
///
/// Accepts either a bare name (`memory = "sliding_window"`) or a table
/// (`memory = { name = "summary_memory", params = { max_history_len = 8 } }`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ComponentSpec")]
pub struct ComponentConfig {
    pub name: String,
    pub params: toml::Table,
    /// Model role to bind for components that call a model.
    pub llm_role: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ComponentSpec {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        params: toml::Table,
        #[serde(default)]
        llm_role: Option<String>,
    },
}

impl From<ComponentSpec> for ComponentConfig {
    fn from(spec: ComponentSpec) -> Self {
        match spec {
            ComponentSpec::Name(name) => Self {
                name,
                ..Self::default()
            },
            ComponentSpec::Full { name, params, llm_role } => Self { name, params, llm_role },
        }
    }
}

impl ComponentConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Deserialize `params` into a typed, `#[serde(default)]` struct.
    pub fn params_as<T: DeserializeOwned>(&self) -> MobiClawResult<T> {
        toml::Value::Table(self.params.clone())
            .try_into()
            .map_err(|e| MobiClawError::Config(format!("invalid params for '{}': {e}", self.name)))
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(toml::Value::as_str)
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.params.get(key)? {
            toml::Value::Float(f) => Some(*f),
            toml::Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn role_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.llm_role.as_deref().unwrap_or(default)
    }

    /// Nested component list under `key` (used by the compound adapter).
    pub fn children(&self, key: &str) -> MobiClawResult<Vec<ComponentConfig>> {
        match self.params.get(key) {
            None => Ok(Vec::new()),
            Some(v) => v
                .clone()
                .try_into()
                .map_err(|e| MobiClawError::Config(format!("invalid '{key}' list for '{}': {e}", self.name))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Ordered perception strategies; index 0 is the primary one.
    pub perception: Vec<ComponentConfig>,
    pub reasoning: ComponentConfig,
    pub memory: ComponentConfig,
    #[serde(default)]
    pub planner: Option<ComponentConfig>,
    #[serde(default)]
    pub verifier: Option<ComponentConfig>,
    #[serde(default = "default_true")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    #[serde(flatten)]
    pub local: LocalKnowledgeConfig,
    /// Extra `category = "template"` pairs for knowledge formatting.
    pub templates: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub platform: String,
    pub language: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            platform: "android".into(),
            language: "en".into(),
        }
    }
}

impl AppConfig {
    /// Check every component name against the registry, compound children included.
    pub fn validate(&self, registry: &ComponentRegistry) -> MobiClawResult<()> {
        if self.agent.perception.is_empty() {
            return Err(MobiClawError::Config("agent.perception must list at least one strategy".into()));
        }
        for p in &self.agent.perception {
            registry.validate_perception(p)?;
        }
        registry.validate_memory(&self.agent.memory)?;
        registry.validate_reasoning(&self.agent.reasoning)?;
        if let Some(p) = &self.agent.planner {
            registry.validate_planner(p)?;
        }
        if let Some(v) = &self.agent.verifier {
            registry.validate_verifier(v)?;
        }
        registry.validate_device(&self.device)?;
        for (role, entry) in [
            ("reasoning", &self.llm.roles.reasoning),
            ("planner", &self.llm.roles.planner),
            ("summary", &self.llm.roles.summary),
        ] {
            if let Some(entry) = entry {
                if !self.llm.providers.contains_key(&entry.provider) {
                    return Err(MobiClawError::Config(format!(
                        "role '{role}' references unknown provider '{}'",
                        entry.provider
                    )));
                }
            }
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> MobiClawResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(MobiClawError::Config(format!("config file not found: {}", path.display())));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(MobiClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str, registry: &ComponentRegistry) -> MobiClawResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate(registry)?;
    Ok(config)
}

/// Resolve, read and validate the config. Runs before logging is installed, so
/// it does not log; the caller reports the returned path.
pub fn load_config(explicit: Option<&Path>, registry: &ComponentRegistry) -> MobiClawResult<(PathBuf, AppConfig)> {
    let path = resolve_config_path(explicit)?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content, registry)?;
    Ok((path, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[llm]
active_provider = "local"

[llm.providers.local]
display_name = "Local"
api_base = "http://localhost:8000/v1"
model = "qwen-vl"

[agent]
perception = ["grid", { name = "som_perception", params = { url = "http://localhost:9000/detect" } }]
reasoning = { name = "universal_reasoning", params = { template = "general" } }
memory = { name = "sliding_window", params = { window_size = 4 } }
verifier = { name = "screen_diff", params = { threshold = 0.02 } }

[device]
name = "mock"

[runner]
max_steps = 5

[apps.clock]
android_en = "Clock"
"#;

    #[test]
    fn sample_config_parses_and_validates() {
        let cfg = parse_config(SAMPLE, &ComponentRegistry::with_builtins()).unwrap();
        assert_eq!(cfg.agent.perception.len(), 2);
        assert_eq!(cfg.agent.perception[0].name, "grid");
        assert_eq!(cfg.agent.perception[1].param_str("url"), Some("http://localhost:9000/detect"));
        assert_eq!(cfg.agent.verifier.as_ref().and_then(|v| v.param_f64("threshold")), Some(0.02));
        assert_eq!(cfg.runner.max_steps, 5);
        assert_eq!(cfg.runner.settle_ms, 1500);
        assert_eq!(cfg.env.platform, "android");
        assert_eq!(cfg.apps["clock"]["android_en"], "Clock");
    }

    #[test]
    fn unknown_component_fails_at_load_time() {
        let bad = SAMPLE.replace("\"grid\"", "\"hologram\"");
        let err = parse_config(&bad, &ComponentRegistry::with_builtins()).unwrap_err();
        match err {
            MobiClawError::UnknownComponent { kind, name, registered } => {
                assert_eq!(kind, "perception");
                assert_eq!(name, "hologram");
                assert!(registered.contains("grid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn role_with_unknown_provider_is_rejected() {
        let bad = format!("{SAMPLE}\n[llm.roles.reasoning]\nprovider = \"nope\"\nmodel = \"m\"\n");
        assert!(matches!(
            parse_config(&bad, &ComponentRegistry::with_builtins()),
            Err(MobiClawError::Config(_))
        ));
    }

    #[test]
    fn load_config_returns_the_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mobiclaw.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let (found, cfg) = load_config(Some(&path), &ComponentRegistry::with_builtins()).unwrap();
        assert_eq!(found, path);
        assert_eq!(cfg.device.name, "mock");
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        assert!(resolve_config_path(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }
}
