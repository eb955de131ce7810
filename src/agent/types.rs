use serde::{Deserialize, Serialize};

use crate::routing::ModelTier;

/// The fixed pool of specialist workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistRole {
    Researcher,
    Coder,
    Reviewer,
    Risk,
    Growth,
    Compliance,
}

impl SpecialistRole {
    pub const ALL: [SpecialistRole; 6] = [
        SpecialistRole::Researcher,
        SpecialistRole::Coder,
        SpecialistRole::Reviewer,
        SpecialistRole::Risk,
        SpecialistRole::Growth,
        SpecialistRole::Compliance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpecialistRole::Researcher => "researcher",
            SpecialistRole::Coder => "coder",
            SpecialistRole::Reviewer => "reviewer",
            SpecialistRole::Risk => "risk",
            SpecialistRole::Growth => "growth",
            SpecialistRole::Compliance => "compliance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "researcher" | "research" => Some(SpecialistRole::Researcher),
            "coder" | "programmer" | "developer" => Some(SpecialistRole::Coder),
            "reviewer" | "review" => Some(SpecialistRole::Reviewer),
            "risk" | "risk_analyst" => Some(SpecialistRole::Risk),
            "growth" | "growth_strategist" => Some(SpecialistRole::Growth),
            "compliance" | "compliance_officer" => Some(SpecialistRole::Compliance),
            _ => None,
        }
    }

    /// Risk work needs the strongest tier; everything else runs on the standard tier.
    pub fn default_tier(&self) -> ModelTier {
        match self {
            SpecialistRole::Risk => ModelTier::Heavy,
            _ => ModelTier::Standard,
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            SpecialistRole::Researcher => 0.3,
            SpecialistRole::Coder => 0.2,
            SpecialistRole::Reviewer => 0.1,
            SpecialistRole::Risk => 0.2,
            SpecialistRole::Growth => 0.7,
            SpecialistRole::Compliance => 0.1,
        }
    }

    /// Confidence assigned when the response cannot be parsed.
    pub fn degraded_confidence(&self) -> f32 {
        match self {
            SpecialistRole::Growth => 0.7,
            SpecialistRole::Researcher | SpecialistRole::Reviewer => 0.6,
            SpecialistRole::Coder | SpecialistRole::Risk | SpecialistRole::Compliance => 0.5,
        }
    }

    /// Prior outputs worth feeding into this role's prompt.
    pub fn context_sources(&self) -> &'static [SpecialistRole] {
        match self {
            SpecialistRole::Researcher => &[],
            SpecialistRole::Coder => &[SpecialistRole::Researcher],
            SpecialistRole::Reviewer => &[SpecialistRole::Coder, SpecialistRole::Researcher],
            SpecialistRole::Risk => &[SpecialistRole::Researcher, SpecialistRole::Compliance],
            SpecialistRole::Growth => &[SpecialistRole::Researcher, SpecialistRole::Risk],
            SpecialistRole::Compliance => &[SpecialistRole::Researcher, SpecialistRole::Coder],
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SpecialistRole::Researcher => "gathers facts from the knowledge base and cites sources",
            SpecialistRole::Coder => "writes or explains code",
            SpecialistRole::Reviewer => "reviews code or findings for errors and gaps",
            SpecialistRole::Risk => "assesses business, technical and operational risk",
            SpecialistRole::Growth => "identifies growth opportunities and recommendations",
            SpecialistRole::Compliance => "checks regulatory and policy compliance",
        }
    }

    pub fn system_prompt(&self) -> String {
        let (base, schema) = match self {
            SpecialistRole::Researcher => (
                "You are a research specialist for an enterprise knowledge platform. \
                 Ground every claim in the provided context, distinguish facts from interpretation, \
                 and cite the sources you relied on.",
                r#"{"summary": string, "key_findings": [string], "sources": [string], "confidence": float}"#,
            ),
            SpecialistRole::Coder => (
                "You are an expert software engineer. Produce correct, minimal code for the task. \
                 Never invent APIs or files you have not been shown.",
                r#"{"language": string, "code": string, "explanation": string, "confidence": float}"#,
            ),
            SpecialistRole::Reviewer => (
                "You are a strict technical reviewer and fact-checker. Compare the prior outputs \
                 against the task, flag contradictions and unverified claims.",
                r#"{"verdict": "approve" | "revise", "issues": [string], "suggestions": [string], "confidence": float}"#,
            ),
            SpecialistRole::Risk => (
                "You are a risk analyst. Identify business, technical, security and operational risks, \
                 rate their severity and propose mitigations.",
                r#"{"risk_level": "low" | "medium" | "high" | "critical", "risks": [string], "mitigations": [string], "confidence": float}"#,
            ),
            SpecialistRole::Growth => (
                "You are a growth strategist. Identify concrete opportunities and actionable recommendations.",
                r#"{"opportunities": [string], "recommendations": [string], "confidence": float}"#,
            ),
            SpecialistRole::Compliance => (
                "You are a compliance officer. Check the task against applicable regulations and internal policy \
                 and list any violations.",
                r#"{"compliant": bool, "regulations": [string], "violations": [string], "recommendations": [string], "confidence": float}"#,
            ),
        };
        format!("{}\n\nRespond with a single JSON object of the form:\n{}", base, schema)
    }
}

impl std::fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for a specialist agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: SpecialistRole,
    pub tier: ModelTier,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Character budget for prior-output context.
    pub context_chars: usize,
}

impl AgentConfig {
    pub fn new(role: SpecialistRole) -> Self {
        Self {
            role,
            tier: role.default_tier(),
            system_prompt: role.system_prompt(),
            temperature: role.default_temperature(),
            max_tokens: 2048,
            context_chars: 3000,
        }
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }
}
