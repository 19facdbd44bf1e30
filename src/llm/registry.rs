use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{LlmConfig, RoleEntry};
use crate::errors::{MobiClawError, MobiClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> MobiClawResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| MobiClawError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn list_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Return the provider and call configuration for a named agent role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, non-streaming
    pub fn call_config_for_role(&self, role: &str) -> MobiClawResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let role_entry: Option<&RoleEntry> = match role {
            "reasoning" => self.llm_config.roles.reasoning.as_ref(),
            "planner" => self.llm_config.roles.planner.as_ref(),
            "summary" => self.llm_config.roles.summary.as_ref(),
            other => {
                tracing::warn!(role = other, "unknown role, falling back to active provider");
                None
            }
        };

        if let Some(entry) = role_entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                MobiClawError::Config(format!(
                    "Role '{}' references unknown provider '{}'",
                    role, entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role,
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature = temperature,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                    max_tokens: entry.max_tokens,
                },
            ));
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            role = role,
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                stream: false,
                temperature,
                max_tokens: None,
            },
        ))
    }

    /// Build a registry from the `[llm]` config section.
    /// API keys are read from environment variables named `MOBICLAW_<ID>_API_KEY`,
    /// falling back to an inline `api_key`.
    pub fn from_config(llm: &LlmConfig) -> MobiClawResult<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
            active: llm.active_provider.clone(),
            llm_config: llm.clone(),
        };
        for (id, entry) in &llm.providers {
            let api_key = std::env::var(format!("MOBICLAW_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                entry.timeout_secs,
            )?;
            registry.register(Arc::new(provider));
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderEntry, RolesConfig};

    fn llm_config() -> LlmConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderEntry {
                display_name: "Local".into(),
                api_base: "http://127.0.0.1:8000/v1".into(),
                model: "default-vl".into(),
                temperature: 0.3,
                api_key: Some("k".into()),
                timeout_secs: 10,
            },
        );
        LlmConfig {
            active_provider: "local".into(),
            providers,
            roles: RolesConfig {
                summary: Some(RoleEntry {
                    provider: "local".into(),
                    model: "small".into(),
                    stream: false,
                    temperature: None,
                    max_tokens: Some(256),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn configured_role_uses_its_model() {
        let reg = ProviderRegistry::from_config(&llm_config()).unwrap();
        let (p, cfg) = reg.call_config_for_role("summary").unwrap();
        assert_eq!(p.name(), "local");
        assert_eq!(cfg.model, "small");
        assert_eq!(cfg.temperature, 0.3);
        assert_eq!(cfg.max_tokens, Some(256));
    }

    #[test]
    fn missing_role_falls_back_to_active_provider() {
        let reg = ProviderRegistry::from_config(&llm_config()).unwrap();
        let (_, cfg) = reg.call_config_for_role("reasoning").unwrap();
        assert_eq!(cfg.model, "default-vl");
        assert!(!cfg.stream);
    }

    #[test]
    fn role_with_unknown_provider_is_config_error() {
        let mut llm = llm_config();
        llm.roles.planner = Some(RoleEntry {
            provider: "ghost".into(),
            model: "m".into(),
            stream: true,
            temperature: None,
            max_tokens: None,
        });
        let reg = ProviderRegistry::from_config(&llm).unwrap();
        assert!(matches!(reg.call_config_for_role("planner"), Err(MobiClawError::Config(_))));
    }
}
