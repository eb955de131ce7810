//! Agent Module
//!
//! LLM provider seam, specialist roles and their shared execution contract.

mod output;
mod provider;
mod research;
mod specialist;
mod types;

pub use output::{
    AgentOutput, CodeArtifact, ComplianceReport, GrowthPlan, ResearchFindings, ReviewReport, RiskAssessment,
    RolePayload,
};
pub use provider::{LLMConfig, LLMProvider, LLMResponse, OpenAICompatibleProvider, ProviderError, TierPricing};
pub use research::{Citation, ResearchQuery, ResearchResult, ResearchService, RetrievalStrategy, SearchHit};
pub use specialist::SpecialistAgent;
pub use types::{AgentConfig, SpecialistRole};
