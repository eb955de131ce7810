//! Research Service
//!
//! Retrieval seam used by the researcher role. The orchestrator only
//! depends on this trait; backends (vector, graph, hybrid) live elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Vector,
    Graph,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub text: String,
    pub tenant_id: String,
    pub top_k: usize,
    pub strategy: RetrievalStrategy,
    pub max_hops: u32,
}

impl ResearchQuery {
    pub fn new(text: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tenant_id: tenant_id.into(),
            top_k: 5,
            strategy: RetrievalStrategy::default(),
            max_hops: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchResult {
    pub text: String,
    pub citations: Vec<Citation>,
    pub search_results: Vec<SearchHit>,
    pub total_latency_ms: u64,
}

#[async_trait]
pub trait ResearchService: Send + Sync {
    async fn query(&self, query: ResearchQuery) -> anyhow::Result<ResearchResult>;
}
