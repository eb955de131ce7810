//! Typed specialist outputs.
//!
//! Each role returns its own payload shape. Responses that carry no usable
//! JSON fall back to [`RolePayload::Degraded`] so downstream nodes never see
//! an untyped blob.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::SpecialistRole;
use crate::utils::extract_json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchFindings {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeArtifact {
    pub language: String,
    pub code: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewReport {
    pub verdict: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskAssessment {
    pub risk_level: String,
    pub risks: Vec<String>,
    pub mitigations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthPlan {
    pub opportunities: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceReport {
    pub compliant: bool,
    pub regulations: Vec<String>,
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RolePayload {
    Research(ResearchFindings),
    Code(CodeArtifact),
    Review(ReviewReport),
    Risk(RiskAssessment),
    Growth(GrowthPlan),
    Compliance(ComplianceReport),
    /// Unparseable response, kept verbatim.
    Degraded { raw_text: String },
    /// No LLM call was made or it failed.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub role: SpecialistRole,
    pub confidence: f32,
    pub payload: RolePayload,
}

impl AgentOutput {
    /// Parse a raw completion into the role's payload.
    pub fn parse(role: SpecialistRole, text: &str) -> Self {
        let Some(value) = extract_json(text) else {
            return Self::degraded(role, text);
        };

        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| (c as f32).clamp(0.0, 1.0))
            .unwrap_or_else(|| role.degraded_confidence());

        match Self::payload_from(role, value) {
            Ok(payload) => Self { role, confidence, payload },
            Err(_) => Self::degraded(role, text),
        }
    }

    fn payload_from(role: SpecialistRole, value: Value) -> serde_json::Result<RolePayload> {
        Ok(match role {
            SpecialistRole::Researcher => RolePayload::Research(serde_json::from_value(value)?),
            SpecialistRole::Coder => RolePayload::Code(serde_json::from_value(value)?),
            SpecialistRole::Reviewer => RolePayload::Review(serde_json::from_value(value)?),
            SpecialistRole::Risk => RolePayload::Risk(serde_json::from_value(value)?),
            SpecialistRole::Growth => RolePayload::Growth(serde_json::from_value(value)?),
            SpecialistRole::Compliance => RolePayload::Compliance(serde_json::from_value(value)?),
        })
    }

    pub fn degraded(role: SpecialistRole, text: &str) -> Self {
        Self {
            role,
            confidence: role.degraded_confidence(),
            payload: RolePayload::Degraded {
                raw_text: text.to_string(),
            },
        }
    }

    pub fn unavailable(role: SpecialistRole, reason: impl Into<String>) -> Self {
        Self {
            role,
            confidence: 0.0,
            payload: RolePayload::Unavailable { reason: reason.into() },
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self.payload, RolePayload::Unavailable { .. })
    }
}
