//! Orchestrator configuration: JSON file with defaults for every field,
//! plus environment overrides.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::agent::{LLMProvider, OpenAICompatibleProvider};
use crate::routing::{ModelTier, RouterConfig, TieredRouter, DEFAULT_PROVIDER};

/// An OpenAI-compatible endpoint. The key is read from `api_key_env` at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ProviderEndpoint {
    fn build(&self, router: &RouterConfig) -> OpenAICompatibleProvider {
        let api_key = self
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());
        ModelTier::ALL.iter().fold(
            OpenAICompatibleProvider::new(self.base_url.clone(), api_key),
            |provider, tier| provider.with_pricing(*tier, router.tiers.get(*tier).pricing),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    pub agent_context_chars: usize,
    pub synthesis_context_chars: usize,
    pub planner_context_chars: usize,
    /// Confidence reported for a synthesized answer.
    pub synthesis_confidence: f32,
    pub router: RouterConfig,
    pub providers: BTreeMap<String, ProviderEndpoint>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            agent_context_chars: 3000,
            synthesis_context_chars: 8000,
            planner_context_chars: 2000,
            synthesis_confidence: 0.85,
            router: RouterConfig::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Apply `AGENCY_MAX_ITERATIONS`, `AGENCY_LLM_BASE_URL` and `AGENCY_LLM_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("AGENCY_MAX_ITERATIONS") {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.max_iterations = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid AGENCY_MAX_ITERATIONS"),
            }
        }

        if let Ok(base_url) = std::env::var("AGENCY_LLM_BASE_URL") {
            let endpoint = self
                .providers
                .entry(DEFAULT_PROVIDER.to_string())
                .or_insert_with(|| ProviderEndpoint {
                    base_url: String::new(),
                    api_key_env: None,
                });
            endpoint.base_url = base_url;
        }

        if std::env::var("AGENCY_LLM_API_KEY").is_ok() {
            if let Some(endpoint) = self.providers.get_mut(DEFAULT_PROVIDER) {
                endpoint.api_key_env = Some("AGENCY_LLM_API_KEY".to_string());
            }
        }
    }

    /// Build the router from the configured endpoints. `None` without a
    /// `default` endpoint.
    pub fn build_router(&self) -> Option<TieredRouter> {
        let default = self.providers.get(DEFAULT_PROVIDER)?;
        let provider: Arc<dyn LLMProvider> = Arc::new(default.build(&self.router));
        let mut router = TieredRouter::with_config(provider, self.router.clone());

        for (name, endpoint) in self.providers.iter().filter(|(name, _)| name.as_str() != DEFAULT_PROVIDER) {
            router = router.with_provider(name.clone(), Arc::new(endpoint.build(&self.router)));
        }
        info!(providers = self.providers.len(), "Router configured");
        Some(router)
    }
}

pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the config, writing defaults first if the file is missing.
    pub async fn load(&self) -> Result<OrchestratorConfig> {
        if !self.path.exists() {
            let default = OrchestratorConfig::default();
            self.save(&default).await?;
            return Ok(default);
        }
        let content = fs::read_to_string(&self.path).await?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub async fn save(&self, config: &OrchestratorConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}
