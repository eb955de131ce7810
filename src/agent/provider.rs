use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

use crate::routing::ModelTier;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by provider{}", .retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("response blocked by provider content filter: {0}")]
    ContentFiltered(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    pub tier: ModelTier,
    /// Concrete model name; filled in by the router from the tier table.
    pub model: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LLMConfig {
    pub fn new(tier: ModelTier) -> Self {
        Self {
            tier,
            model: String::new(),
            system: None,
            temperature: 0.7,
            max_tokens: 2048,
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    pub text: String,
    pub tier: ModelTier,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub cost_usd: f64,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str, config: &LLMConfig) -> Result<LLMResponse, ProviderError>;
}

/// USD per thousand tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl TierPricing {
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    pricing: HashMap<ModelTier, TierPricing>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            pricing: HashMap::new(),
        }
    }

    pub fn with_pricing(mut self, tier: ModelTier, pricing: TierPricing) -> Self {
        self.pricing.insert(tier, pricing);
        self
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(&self, prompt: &str, config: &LLMConfig) -> Result<LLMResponse, ProviderError> {
        let started = Instant::now();

        let mut messages = Vec::new();
        if let Some(ref sys) = config.system {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        let mut request = self.client.post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = res.headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ProviderError::Provider(format!("{}: {}", status, text)));
        }

        let json: serde_json::Value = res.json().await?;

        let choice = &json["choices"][0];
        if choice["finish_reason"].as_str() == Some("content_filter") {
            return Err(ProviderError::ContentFiltered(config.model.clone()));
        }

        let text = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Provider("missing message content in response".to_string()))?
            .to_string();

        let input_tokens = json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        let output_tokens = json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;
        let cost_usd = self.pricing
            .get(&config.tier)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0);

        Ok(LLMResponse {
            text,
            tier: config.tier,
            input_tokens,
            output_tokens,
            latency_ms: started.elapsed().as_millis() as u64,
            cost_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_cost() {
        let pricing = TierPricing { input_per_1k: 0.01, output_per_1k: 0.03 };
        let cost = pricing.cost(2000, 1000);
        assert!((cost - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limit_message() {
        let err = ProviderError::RateLimited { retry_after_secs: Some(30) };
        assert_eq!(err.to_string(), "rate limited by provider (retry after 30s)");
    }
}
