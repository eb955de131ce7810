//! Specialist Agent
//!
//! One execution contract shared by every role: resolve the task, gather
//! prior outputs as context, call the LLM at the role's tier, parse the
//! role payload and hand control back to the supervisor.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::output::AgentOutput;
use super::research::{ResearchQuery, ResearchResult, ResearchService};
use super::types::{AgentConfig, SpecialistRole};
use crate::orchestrator::{AgentTarget, NodeId, OrchestratorState, TaskResult};
use crate::routing::{RouteRequest, TieredRouter};
use crate::utils::truncate_chars;

const RESEARCH_CHARS: usize = 4000;

pub struct SpecialistAgent {
    config: AgentConfig,
    router: Option<Arc<TieredRouter>>,
    research: Option<Arc<dyn ResearchService>>,
}

impl SpecialistAgent {
    pub fn new(role: SpecialistRole, router: Option<Arc<TieredRouter>>) -> Self {
        Self {
            config: AgentConfig::new(role),
            router,
            research: None,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Only the researcher consults the retrieval service.
    pub fn with_research(mut self, research: Option<Arc<dyn ResearchService>>) -> Self {
        self.research = research;
        self
    }

    pub fn role(&self) -> SpecialistRole {
        self.config.role
    }

    /// Prior outputs of the roles this one builds on, bounded to the context budget.
    pub fn build_context(&self, state: &OrchestratorState) -> String {
        let mut sections = Vec::new();
        for source in self.config.role.context_sources() {
            if let Some(TaskResult::Specialist(output)) = state.agent_outputs.get(source.name()) {
                if !output.is_usable() {
                    continue;
                }
                let rendered = serde_json::to_string(&output.payload).unwrap_or_default();
                sections.push(format!("## {} (confidence {:.2})\n{}", source, output.confidence, rendered));
            }
        }
        truncate_chars(&sections.join("\n\n"), self.config.context_chars)
    }

    fn build_prompt(&self, task: &str, user_query: &str, context: &str, research: Option<&ResearchResult>) -> String {
        let mut prompt = format!("ORIGINAL QUERY:\n{}\n\nYOUR TASK:\n{}\n", user_query, task);

        if let Some(research) = research {
            prompt.push_str("\nRETRIEVED KNOWLEDGE:\n");
            prompt.push_str(&truncate_chars(&research.text, RESEARCH_CHARS));
            prompt.push('\n');
            for (i, citation) in research.citations.iter().enumerate() {
                prompt.push_str(&format!("[{}] {}\n", i + 1, citation.source));
            }
        }

        if !context.is_empty() {
            prompt.push_str("\nPRIOR SPECIALIST OUTPUTS:\n");
            prompt.push_str(context);
            prompt.push('\n');
        }

        prompt.push_str("\nRespond with the JSON object described in your instructions.");
        prompt
    }

    async fn retrieve(&self, task: &str, state: &OrchestratorState) -> Option<ResearchResult> {
        if self.config.role != SpecialistRole::Researcher {
            return None;
        }
        let service = self.research.as_ref()?;
        match service.query(ResearchQuery::new(task, state.tenant_id.clone())).await {
            Ok(result) => {
                debug!(
                    citations = result.citations.len(),
                    latency_ms = result.total_latency_ms,
                    "Research retrieval complete"
                );
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, "Research service failed, continuing without retrieval");
                None
            }
        }
    }

    /// Run this specialist against the current in-progress task.
    pub async fn execute(&self, state: &mut OrchestratorState) {
        let role = self.config.role;
        let target = AgentTarget::Specialist { role };
        let task_index = state
            .in_progress_index()
            .filter(|&i| state.task_plan[i].target == target);
        let task = match task_index {
            Some(i) => state.task_plan[i].description.clone(),
            None => state.user_query.clone(),
        };

        let output = match self.router.clone() {
            None => AgentOutput::unavailable(role, "no LLM provider configured"),
            Some(router) => {
                let research = self.retrieve(&task, state).await;
                let context = self.build_context(state);
                let prompt = self.build_prompt(&task, &state.user_query, &context, research.as_ref());

                if let Some(research) = research {
                    state.citations.extend(research.citations);
                }

                let request = RouteRequest::new(prompt)
                    .with_system(self.config.system_prompt.clone())
                    .with_temperature(self.config.temperature)
                    .with_max_tokens(self.config.max_tokens)
                    .force_tier(self.config.tier);

                match router.route(request).await {
                    Ok(routed) => {
                        state.record_llm_call(&routed);
                        AgentOutput::parse(role, &routed.response.text)
                    }
                    Err(e) => {
                        warn!(role = %role, error = %e, "Specialist LLM call failed");
                        AgentOutput::unavailable(role, e.to_string())
                    }
                }
            }
        };

        info!(
            trace_id = %state.trace_id,
            role = %role,
            confidence = output.confidence,
            "Specialist finished"
        );

        let result = TaskResult::Specialist(output);
        if let Some(i) = task_index {
            state.finish_task(i, result.clone(), false);
        }
        state.agent_outputs.insert(role.name().to_string(), result);
        state.mark_agent_used(role.name());
        state.next_agent = Some(NodeId::SupervisorPlan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::output::RolePayload;
    use crate::orchestrator::{SubTask, TaskStatus};

    #[tokio::test]
    async fn test_without_provider_emits_stub() {
        let agent = SpecialistAgent::new(SpecialistRole::Coder, None);
        let mut state = OrchestratorState::new("Write a parser", "tenant");
        state.task_plan.push(SubTask::new(
            "t1",
            "write the parser",
            AgentTarget::Specialist { role: SpecialistRole::Coder },
        ));
        state.task_plan[0].status = TaskStatus::InProgress;

        agent.execute(&mut state).await;

        assert_eq!(state.task_plan[0].status, TaskStatus::Completed);
        assert_eq!(state.next_agent, Some(NodeId::SupervisorPlan));
        match state.agent_outputs.get("coder") {
            Some(TaskResult::Specialist(output)) => {
                assert_eq!(output.confidence, 0.0);
                assert!(matches!(output.payload, RolePayload::Unavailable { .. }));
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(state.agents_used, vec!["coder".to_string()]);
    }

    #[test]
    fn test_context_uses_declared_sources_only() {
        let agent = SpecialistAgent::new(SpecialistRole::Coder, None).with_config(
            AgentConfig::new(SpecialistRole::Coder).with_context_chars(10_000),
        );
        let mut state = OrchestratorState::new("q", "t");
        state.agent_outputs.insert(
            "researcher".to_string(),
            TaskResult::Specialist(AgentOutput::parse(
                SpecialistRole::Researcher,
                r#"{"summary": "uses tokio", "confidence": 0.9}"#,
            )),
        );
        state.agent_outputs.insert(
            "growth".to_string(),
            TaskResult::Specialist(AgentOutput::degraded(SpecialistRole::Growth, "expand")),
        );

        let context = agent.build_context(&state);
        assert!(context.contains("## researcher (confidence 0.90)"));
        assert!(context.contains("uses tokio"));
        assert!(!context.contains("expand"));
    }

    #[test]
    fn test_context_is_bounded() {
        let agent = SpecialistAgent::new(SpecialistRole::Reviewer, None)
            .with_config(AgentConfig::new(SpecialistRole::Reviewer).with_context_chars(50));
        let mut state = OrchestratorState::new("q", "t");
        state.agent_outputs.insert(
            "coder".to_string(),
            TaskResult::Specialist(AgentOutput::degraded(SpecialistRole::Coder, &"x".repeat(500))),
        );

        let context = agent.build_context(&state);
        assert!(context.ends_with("...[truncated]"));
        assert!(context.chars().count() <= 50 + "...[truncated]".len());
    }
}
