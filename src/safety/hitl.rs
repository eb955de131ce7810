//! Human-in-the-loop gate. Terminal node of every run.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{SafetyAction, SafetyVerdict};
use crate::orchestrator::{DeploymentContext, OrchestratorState};

pub const HITL_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const SANITIZED_REASON: &str = "Content was sanitized by safety agent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlDecision {
    pub required: bool,
    pub reason: Option<String>,
}

impl HitlDecision {
    /// Low confidence first, then the deployment context. A sanitized
    /// answer always needs review and overrides the reason.
    pub fn evaluate(confidence: f32, context: DeploymentContext, verdict: Option<&SafetyVerdict>) -> Self {
        let mut decision = if confidence < HITL_CONFIDENCE_THRESHOLD {
            Self {
                required: true,
                reason: Some(format!("Low confidence: {:.2}", confidence)),
            }
        } else if context.requires_review() {
            Self {
                required: true,
                reason: Some(format!("Deployment context '{}' requires human review", context)),
            }
        } else {
            Self {
                required: false,
                reason: None,
            }
        };

        if verdict.map(|v| v.action) == Some(SafetyAction::Sanitize) {
            decision.required = true;
            decision.reason = Some(SANITIZED_REASON.to_string());
        }
        decision
    }
}

pub struct HitlGate;

impl HitlGate {
    pub fn apply(state: &mut OrchestratorState) {
        let decision = HitlDecision::evaluate(
            state.confidence,
            state.deployment_context,
            state.safety_verdict.as_ref(),
        );
        if decision.required {
            info!(
                trace_id = %state.trace_id,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "Human review required"
            );
        }
        state.hitl_required = decision.required;
        state.hitl_reason = decision.reason;
        state.next_agent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(action: SafetyAction) -> SafetyVerdict {
        SafetyVerdict {
            safe: action == SafetyAction::Allow,
            threats: Vec::new(),
            action,
        }
    }

    #[test]
    fn test_low_confidence_requires_review() {
        let decision = HitlDecision::evaluate(0.4, DeploymentContext::General, None);
        assert!(decision.required);
        assert_eq!(decision.reason.as_deref(), Some("Low confidence: 0.40"));
    }

    #[test]
    fn test_low_confidence_wins_over_context() {
        let decision = HitlDecision::evaluate(0.3, DeploymentContext::Legal, None);
        assert!(decision.reason.unwrap().contains("Low confidence"));
    }

    #[test]
    fn test_sensitive_context_requires_review() {
        let decision = HitlDecision::evaluate(0.9, DeploymentContext::Financial, None);
        assert!(decision.required);
        assert!(decision.reason.unwrap().contains("financial"));
    }

    #[test]
    fn test_confident_general_answer_passes() {
        let allow = verdict(SafetyAction::Allow);
        let decision = HitlDecision::evaluate(0.85, DeploymentContext::General, Some(&allow));
        assert!(!decision.required);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn test_sanitize_overrides_reason() {
        let sanitized = verdict(SafetyAction::Sanitize);
        let decision = HitlDecision::evaluate(0.2, DeploymentContext::Legal, Some(&sanitized));
        assert!(decision.required);
        assert_eq!(decision.reason.as_deref(), Some(SANITIZED_REASON));

        let decision = HitlDecision::evaluate(0.95, DeploymentContext::General, Some(&sanitized));
        assert!(decision.required);
    }

    #[test]
    fn test_gate_terminates_graph() {
        let mut state = OrchestratorState::new("q", "t");
        state.confidence = 0.4;
        HitlGate::apply(&mut state);
        assert!(state.hitl_required);
        assert!(state.next_agent.is_none());
    }
}
