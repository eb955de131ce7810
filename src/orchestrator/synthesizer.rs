//! Synthesizer
//!
//! Composes the final answer from every task output in one mid-tier call.

use std::sync::Arc;
use tracing::{info, warn};

use super::state::{NodeId, OrchestratorState, TaskResult};
use crate::agent::RolePayload;
use crate::routing::{ModelTier, RouteRequest, TieredRouter};
use crate::utils::truncate_chars;

const SYSTEM_PROMPT: &str = "You are the lead analyst of an enterprise knowledge platform. \
You write the final answer for the user from the findings of specialist agents and tools. \
Be accurate and complete, cite sources with [n] markers where citations are given, \
and say plainly when the findings do not support an answer.";

pub struct Synthesizer {
    router: Option<Arc<TieredRouter>>,
    context_chars: usize,
    default_confidence: f32,
}

impl Synthesizer {
    pub fn new(router: Option<Arc<TieredRouter>>) -> Self {
        Self {
            router,
            context_chars: 8000,
            default_confidence: 0.85,
        }
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    pub fn with_default_confidence(mut self, confidence: f32) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub async fn synthesize(&self, state: &mut OrchestratorState) {
        state.next_agent = Some(NodeId::SafetyCheck);

        let Some(ref router) = self.router else {
            state.final_answer = digest(state);
            state.confidence = 0.0;
            return;
        };

        let request = RouteRequest::new(self.build_prompt(state))
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.3)
            .with_max_tokens(2048)
            .force_tier(ModelTier::Standard);

        match router.route(request).await {
            Ok(routed) => {
                state.record_llm_call(&routed);
                state.final_answer = routed.response.text.trim().to_string();
                state.confidence = self.default_confidence;
                info!(
                    trace_id = %state.trace_id,
                    outputs = state.agent_outputs.len(),
                    "Synthesized final answer"
                );
            }
            Err(e) => {
                warn!(error = %e, "Synthesis call failed, returning digest of task outputs");
                state.final_answer = digest(state);
                state.confidence = 0.0;
            }
        }
    }

    fn build_prompt(&self, state: &OrchestratorState) -> String {
        let outputs = serde_json::to_string_pretty(&state.agent_outputs).unwrap_or_default();
        let mut prompt = format!(
            "USER QUERY:\n{}\n\nSPECIALIST AND TOOL OUTPUTS (keyed by role or task id):\n{}\n",
            state.user_query,
            truncate_chars(&outputs, self.context_chars)
        );

        if !state.citations.is_empty() {
            prompt.push_str("\nCITATIONS:\n");
            for (i, citation) in state.citations.iter().enumerate() {
                let title = citation.title.as_deref().unwrap_or(&citation.source);
                prompt.push_str(&format!("[{}] {} ({})\n", i + 1, title, citation.source));
            }
        }

        prompt.push_str("\nWrite a comprehensive, well-cited answer to the user query.");
        prompt
    }
}

/// Plain rendering of the outputs, used when no model can write the answer.
fn digest(state: &OrchestratorState) -> String {
    let mut lines = Vec::new();
    for (key, result) in &state.agent_outputs {
        let line = match result {
            TaskResult::Plugin(out) if out.success => format!("{}: {}", key, out.data),
            TaskResult::Plugin(out) => format!("{}: failed ({})", key, out.error.as_deref().unwrap_or("unknown error")),
            TaskResult::Specialist(out) => match &out.payload {
                RolePayload::Research(r) => format!("{}: {}", key, r.summary),
                RolePayload::Degraded { raw_text } => format!("{}: {}", key, raw_text.trim()),
                RolePayload::Unavailable { .. } => continue,
                other => format!("{}: {}", key, serde_json::to_string(other).unwrap_or_default()),
            },
        };
        lines.push(line);
    }

    if lines.is_empty() {
        "No answer could be produced: no language model is available and no task produced output.".to_string()
    } else {
        format!("Collected results for \"{}\":\n{}", state.user_query, lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentOutput, SpecialistRole};
    use crate::tools::PluginOutput;
    use serde_json::json;

    #[tokio::test]
    async fn test_without_router_digests_outputs() {
        let synth = Synthesizer::new(None);
        let mut state = OrchestratorState::new("What is 50*2?", "t");
        state
            .agent_outputs
            .insert("t1".to_string(), TaskResult::Plugin(PluginOutput::success(json!({"result": 100}))));
        state.agent_outputs.insert(
            "coder".to_string(),
            TaskResult::Specialist(AgentOutput::unavailable(SpecialistRole::Coder, "no provider")),
        );

        synth.synthesize(&mut state).await;

        assert_eq!(state.next_agent, Some(NodeId::SafetyCheck));
        assert_eq!(state.confidence, 0.0);
        assert!(state.final_answer.contains("t1: {\"result\":100}"));
        assert!(!state.final_answer.contains("coder"));
    }

    #[tokio::test]
    async fn test_empty_outputs_still_answer() {
        let synth = Synthesizer::new(None);
        let mut state = OrchestratorState::new("hello", "t");
        synth.synthesize(&mut state).await;
        assert!(state.final_answer.starts_with("No answer could be produced"));
    }

    #[test]
    fn test_prompt_is_bounded() {
        let synth = Synthesizer::new(None).with_context_chars(100);
        let mut state = OrchestratorState::new("q", "t");
        state.agent_outputs.insert(
            "researcher".to_string(),
            TaskResult::Specialist(AgentOutput::degraded(SpecialistRole::Researcher, &"z".repeat(5000))),
        );
        let prompt = synth.build_prompt(&state);
        assert!(prompt.contains("...[truncated]"));
        assert!(prompt.len() < 1000);
    }
}
