//! Tiered Router
//!
//! Picks the model tier for a call, guards each tier with a circuit breaker
//! and retries at the next tier up when a response is weak.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitBreakerState};
use super::complexity::{ComplexityAnalyzer, TierThresholds};
use super::tier::{ModelTier, TaskType};
use crate::agent::{LLMConfig, LLMProvider, LLMResponse, ProviderError, TierPricing};
use crate::utils::extract_json;

pub const DEFAULT_PROVIDER: &str = "default";

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("circuit open for {tier} tier, call rejected")]
    CircuitOpen { tier: ModelTier },
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("escalation exhausted at {tier} tier: {source}")]
    EscalationExhausted {
        tier: ModelTier,
        #[source]
        source: ProviderError,
    },
    #[error("{tier} tier call failed: {source}")]
    Provider {
        tier: ModelTier,
        #[source]
        source: ProviderError,
    },
}

/// Routing outcome for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub initial_tier: ModelTier,
    pub final_tier: ModelTier,
    pub escalated: bool,
    pub escalation_reason: Option<String>,
    pub complexity_score: f32,
    pub task_type_detected: String,
    pub provider: String,
    /// Still weak at the top tier; nothing left to escalate to.
    pub escalation_exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub response: LLMResponse,
    pub decision: RoutingDecision,
    pub attempts: u32,
    pub total_cost_usd: f64,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub task_type_hint: Option<TaskType>,
    /// Text to classify instead of the full prompt.
    pub classify_text: Option<String>,
    pub force_tier: Option<ModelTier>,
    pub provider: Option<String>,
    pub allow_escalation: bool,
}

impl RouteRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: 2048,
            task_type_hint: None,
            classify_text: None,
            force_tier: None,
            provider: None,
            allow_escalation: true,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_hint(mut self, hint: TaskType) -> Self {
        self.task_type_hint = Some(hint);
        self
    }

    /// Classify on `text` rather than the prompt, so template boilerplate
    /// around a user request does not move the tier.
    pub fn classify_on(mut self, text: impl Into<String>) -> Self {
        self.classify_text = Some(text.into());
        self
    }

    /// Bypass classification and dispatch at exactly this tier.
    pub fn force_tier(mut self, tier: ModelTier) -> Self {
        self.force_tier = Some(tier);
        self
    }

    /// Pin dispatch to a named provider.
    pub fn on_provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    pub fn without_escalation(mut self) -> Self {
        self.allow_escalation = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierModel {
    pub model: String,
    #[serde(default)]
    pub pricing: TierPricing,
    /// Provider name serving this tier; the default provider when unset.
    #[serde(default)]
    pub provider: Option<String>,
}

impl TierModel {
    fn local(model: &str) -> Self {
        Self {
            model: model.to_string(),
            pricing: TierPricing::default(),
            provider: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub tiny: TierModel,
    pub standard: TierModel,
    pub heavy: TierModel,
}

impl TierTable {
    pub fn get(&self, tier: ModelTier) -> &TierModel {
        match tier {
            ModelTier::Tiny => &self.tiny,
            ModelTier::Standard => &self.standard,
            ModelTier::Heavy => &self.heavy,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiny: TierModel::local("qwen2.5-coder:0.5b"),
            standard: TierModel::local("qwen2.5:3b-q4"),
            heavy: TierModel::local("qwen2.5:7b-q4"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub thresholds: TierThresholds,
    /// Responses scoring below this are retried one tier up.
    pub escalation_confidence_threshold: f32,
    pub allow_escalation: bool,
    pub breaker: BreakerSettings,
    pub tiers: TierTable,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            thresholds: TierThresholds::default(),
            escalation_confidence_threshold: 0.6,
            allow_escalation: true,
            breaker: BreakerSettings::default(),
            tiers: TierTable::default(),
        }
    }
}

/// Heuristic quality of a raw completion, 0.0-1.0. An embedded JSON
/// `confidence` field wins over text cues.
pub fn assess_confidence(text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    if let Some(value) = extract_json(trimmed) {
        if let Some(conf) = value.get("confidence").and_then(|c| c.as_f64()) {
            return (conf as f32).clamp(0.0, 1.0);
        }
    }

    let lower = trimmed.to_lowercase();
    let refusals = ["i cannot", "i can't", "i'm unable", "i am unable", "as an ai"];
    let hedges = ["i'm not sure", "i am not sure", "i don't know", "unclear"];

    if refusals.iter().any(|r| lower.contains(r)) {
        0.3
    } else if hedges.iter().any(|h| lower.contains(h)) {
        0.5
    } else {
        0.8
    }
}

/// A dispatch target with its own breaker per tier.
struct ProviderSlot {
    provider: Arc<dyn LLMProvider>,
    breakers: [CircuitBreaker; 3],
}

impl ProviderSlot {
    fn new(name: &str, provider: Arc<dyn LLMProvider>, settings: BreakerSettings) -> Self {
        Self {
            provider,
            breakers: ModelTier::ALL.map(|tier| CircuitBreaker::new(format!("{}:{}", name, tier), settings)),
        }
    }

    fn breaker(&self, tier: ModelTier) -> &CircuitBreaker {
        &self.breakers[tier as usize]
    }
}

/// A weak response kept while a stronger tier is tried.
struct Fallback {
    response: LLMResponse,
    confidence: f32,
    tier: ModelTier,
    provider: String,
}

pub struct TieredRouter {
    default_slot: ProviderSlot,
    providers: HashMap<String, ProviderSlot>,
    analyzer: ComplexityAnalyzer,
    config: RouterConfig,
}

impl TieredRouter {
    pub fn new(default_provider: Arc<dyn LLMProvider>) -> Self {
        Self::with_config(default_provider, RouterConfig::default())
    }

    pub fn with_config(default_provider: Arc<dyn LLMProvider>, config: RouterConfig) -> Self {
        Self {
            default_slot: ProviderSlot::new(DEFAULT_PROVIDER, default_provider, config.breaker),
            providers: HashMap::new(),
            analyzer: ComplexityAnalyzer::new(),
            config,
        }
    }

    /// Register a named alternate provider. It gets its own breakers.
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        let name = name.into();
        let slot = ProviderSlot::new(&name, provider, self.config.breaker);
        self.providers.insert(name, slot);
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Breaker of the default provider at `tier`.
    pub fn breaker(&self, tier: ModelTier) -> &CircuitBreaker {
        self.default_slot.breaker(tier)
    }

    pub fn breaker_snapshot(&self, tier: ModelTier) -> CircuitBreakerState {
        self.breaker(tier).snapshot()
    }

    /// Breaker of a named provider at `tier`.
    pub fn provider_breaker(&self, name: &str, tier: ModelTier) -> Option<&CircuitBreaker> {
        self.slot(name).ok().map(|slot| slot.breaker(tier))
    }

    fn slot(&self, name: &str) -> Result<&ProviderSlot, RouterError> {
        if name == DEFAULT_PROVIDER {
            return Ok(&self.default_slot);
        }
        self.providers
            .get(name)
            .ok_or_else(|| RouterError::UnknownProvider(name.to_string()))
    }

    fn provider_for(&self, pinned: Option<&str>, tier: ModelTier) -> Result<(String, &ProviderSlot), RouterError> {
        let name = pinned
            .or(self.config.tiers.get(tier).provider.as_deref())
            .unwrap_or(DEFAULT_PROVIDER);
        Ok((name.to_string(), self.slot(name)?))
    }

    fn llm_config(&self, request: &RouteRequest, tier: ModelTier) -> LLMConfig {
        let mut config = LLMConfig::new(tier)
            .with_temperature(request.temperature)
            .with_max_tokens(request.max_tokens);
        config.model = self.config.tiers.get(tier).model.clone();
        config.system = request.system.clone();
        config
    }

    /// Dispatch one call: classify (unless forced), gate on the breaker of
    /// the chosen provider and tier, call the provider and escalate on
    /// failure or weak output. A weak response is kept while escalating and
    /// returned if the stronger tier cannot answer.
    pub async fn route(&self, request: RouteRequest) -> Result<RoutedResponse, RouterError> {
        if let Some(ref name) = request.provider {
            self.slot(name)?;
        }

        let (initial_tier, complexity_score, task_type_detected) = match request.force_tier {
            Some(tier) => (tier, 0.0, "forced".to_string()),
            None => {
                let text = request.classify_text.as_deref().unwrap_or(&request.prompt);
                let features = self.analyzer.extract(text, request.task_type_hint);
                let score = features.score();
                let tier = self.config.thresholds.determine(&features, score);
                debug!(
                    score = score,
                    keyword_tier = %features.keyword_tier,
                    safety = features.safety_sensitivity,
                    "Classified prompt for {} tier", tier
                );
                (tier, score, features.task_type_detected.as_str().to_string())
            }
        };

        let escalatable = request.allow_escalation
            && self.config.allow_escalation
            && request.force_tier.is_none()
            && request.provider.is_none();

        let mut decision = RoutingDecision {
            initial_tier,
            final_tier: initial_tier,
            escalated: false,
            escalation_reason: None,
            complexity_score,
            task_type_detected,
            provider: DEFAULT_PROVIDER.to_string(),
            escalation_exhausted: false,
        };

        let mut tier = initial_tier;
        let mut attempts = 0u32;
        let mut total_cost_usd = 0.0;
        let mut fallback: Option<Fallback> = None;

        loop {
            let (provider_name, slot) = self.provider_for(request.provider.as_deref(), tier)?;
            let breaker = slot.breaker(tier);
            if !breaker.allow_request() {
                warn!(tier = %tier, provider = %provider_name, "Circuit open, failing fast");
                if let Some(kept) = fallback.take() {
                    decision.escalation_reason = Some(format!(
                        "{} tier circuit open, kept {} tier response",
                        tier, kept.tier
                    ));
                    return Ok(Self::settle(decision, kept, attempts, total_cost_usd));
                }
                return Err(RouterError::CircuitOpen { tier });
            }

            attempts += 1;
            let config = self.llm_config(&request, tier);

            match slot.provider.generate(&request.prompt, &config).await {
                Err(err) => {
                    breaker.record_failure();
                    if let Some(kept) = fallback.take() {
                        warn!(tier = %tier, error = %err, "Escalated call failed, keeping weaker response");
                        decision.escalation_reason = Some(format!(
                            "provider error at {} tier: {}, kept {} tier response",
                            tier, err, kept.tier
                        ));
                        return Ok(Self::settle(decision, kept, attempts, total_cost_usd));
                    }
                    if !escalatable {
                        return Err(RouterError::Provider { tier, source: err });
                    }
                    if tier.is_top() {
                        return Err(RouterError::EscalationExhausted { tier, source: err });
                    }
                    let next = tier.escalate();
                    warn!(from = %tier, to = %next, error = %err, "Provider failed, escalating");
                    decision.escalated = true;
                    decision.escalation_reason = Some(format!("provider error at {} tier: {}", tier, err));
                    tier = next;
                }
                Ok(response) => {
                    breaker.record_success();
                    total_cost_usd += response.cost_usd;
                    let confidence = assess_confidence(&response.text);

                    if escalatable && confidence < self.config.escalation_confidence_threshold {
                        if !tier.is_top() {
                            let next = tier.escalate();
                            info!(from = %tier, to = %next, confidence = confidence, "Low confidence, escalating");
                            decision.escalated = true;
                            decision.escalation_reason = Some(format!("low confidence {:.2} at {} tier", confidence, tier));
                            fallback = Some(Fallback {
                                response,
                                confidence,
                                tier,
                                provider: provider_name,
                            });
                            tier = next;
                            continue;
                        }
                        decision.escalation_exhausted = true;
                    }

                    decision.final_tier = tier;
                    decision.provider = provider_name;
                    return Ok(RoutedResponse {
                        response,
                        decision,
                        attempts,
                        total_cost_usd,
                        confidence,
                    });
                }
            }
        }
    }

    /// Answer with a kept weak response after the stronger tier was unavailable.
    fn settle(mut decision: RoutingDecision, kept: Fallback, attempts: u32, total_cost_usd: f64) -> RoutedResponse {
        decision.final_tier = kept.tier;
        decision.provider = kept.provider;
        decision.escalation_exhausted = true;
        RoutedResponse {
            response: kept.response,
            decision,
            attempts,
            total_cost_usd,
            confidence: kept.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_confidence_prefers_embedded_json() {
        assert_eq!(assess_confidence("```json\n{\"confidence\": 0.42}\n```"), 0.42);
        assert_eq!(assess_confidence("   "), 0.0);
        assert_eq!(assess_confidence("I cannot help with that."), 0.3);
        assert_eq!(assess_confidence("Paris is the capital of France."), 0.8);
    }

    #[test]
    fn test_tier_table_lookup() {
        let table = TierTable::default();
        assert_eq!(table.get(ModelTier::Heavy).model, "qwen2.5:7b-q4");
        assert!(table.get(ModelTier::Tiny).provider.is_none());
    }
}
