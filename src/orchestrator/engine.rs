//! Orchestration Engine
//!
//! Owns the collaborators and drives the node state machine for each run:
//! supervisor, executors, synthesizer, safety gate, HITL gate.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::dispatcher::PluginDispatcher;
use super::event_bus::{EventBus, OrchestrationEvent};
use super::planner::Planner;
use super::state::{AgentTarget, DeploymentContext, NodeId, OrchestratorState, TaskResult, TaskStatus};
use super::supervisor::Supervisor;
use super::synthesizer::Synthesizer;
use crate::agent::{AgentConfig, Citation, ResearchService, SpecialistAgent, SpecialistRole};
use crate::config::OrchestratorConfig;
use crate::routing::TieredRouter;
use crate::safety::{HitlGate, SafetyGate, SafetyVerdict};
use crate::tools::{PluginHost, PluginRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_query: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub deployment_context: DeploymentContext,
    /// Overrides the configured cap for this run.
    pub max_iterations: Option<u32>,
}

impl RunRequest {
    pub fn new(user_query: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            tenant_id: tenant_id.into(),
            user_id: None,
            deployment_context: DeploymentContext::default(),
            max_iterations: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_deployment_context(mut self, context: DeploymentContext) -> Self {
        self.deployment_context = context;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationPattern {
    SynthesisOnly,
    SingleAgent,
    MultiAgent,
    PluginAugmented,
}

impl OrchestrationPattern {
    pub fn classify(state: &OrchestratorState) -> Self {
        let dispatched: Vec<&AgentTarget> = state
            .task_plan
            .iter()
            .filter(|t| t.status != TaskStatus::Pending)
            .map(|t| &t.target)
            .collect();

        if dispatched.is_empty() {
            return OrchestrationPattern::SynthesisOnly;
        }
        if dispatched.iter().any(|t| matches!(t, AgentTarget::Plugin { .. })) {
            return OrchestrationPattern::PluginAugmented;
        }
        let distinct: HashSet<String> = dispatched.iter().map(|t| t.label()).collect();
        if distinct.len() > 1 {
            OrchestrationPattern::MultiAgent
        } else {
            OrchestrationPattern::SingleAgent
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub answer: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    pub agents_used: Vec<String>,
    pub orchestration_pattern: OrchestrationPattern,
    pub safety_verdict: Option<SafetyVerdict>,
    pub hitl_required: bool,
    pub hitl_reason: Option<String>,
    pub iterations: u32,
    pub cost_usd: f64,
    pub trace_id: String,
}

impl From<OrchestratorState> for RunResult {
    fn from(state: OrchestratorState) -> Self {
        let orchestration_pattern = OrchestrationPattern::classify(&state);
        Self {
            answer: state.final_answer,
            confidence: state.confidence,
            citations: state.citations,
            agents_used: state.agents_used,
            orchestration_pattern,
            safety_verdict: state.safety_verdict,
            hitl_required: state.hitl_required,
            hitl_reason: state.hitl_reason,
            iterations: state.current_iteration,
            cost_usd: state.cost_accumulated_usd,
            trace_id: state.trace_id,
        }
    }
}

pub struct OrchestrationEngine {
    config: OrchestratorConfig,
    router: Option<Arc<TieredRouter>>,
    research: Option<Arc<dyn ResearchService>>,
    plugins: Arc<dyn PluginRegistry>,
    events: EventBus,
}

impl OrchestrationEngine {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            router: None,
            research: None,
            plugins: Arc::new(PluginHost::new()),
            events: EventBus::new(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_router(mut self, router: Arc<TieredRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_research(mut self, research: Arc<dyn ResearchService>) -> Self {
        self.research = Some(research);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn router(&self) -> Option<&Arc<TieredRouter>> {
        self.router.as_ref()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<OrchestrationEvent> {
        self.events.subscribe()
    }

    /// Fresh state for a request.
    pub fn initial_state(&self, request: RunRequest) -> OrchestratorState {
        let mut state = OrchestratorState::new(request.user_query, request.tenant_id)
            .with_deployment_context(request.deployment_context)
            .with_max_iterations(request.max_iterations.unwrap_or(self.config.max_iterations));
        state.user_id = request.user_id;
        state
    }

    #[instrument(skip_all, fields(tenant = %request.tenant_id))]
    pub async fn run(&self, request: RunRequest) -> RunResult {
        let mut state = self.initial_state(request);
        info!(trace_id = %state.trace_id, max_iterations = state.max_iterations, "Run started");
        self.events.publish(OrchestrationEvent::RunStarted {
            trace_id: state.trace_id.clone(),
            tenant_id: state.tenant_id.clone(),
        });

        self.drive(&mut state).await;

        info!(
            trace_id = %state.trace_id,
            iterations = state.current_iteration,
            confidence = state.confidence,
            hitl_required = state.hitl_required,
            cost_usd = state.cost_accumulated_usd,
            "Run finished"
        );
        self.events.publish(OrchestrationEvent::RunFinished {
            trace_id: state.trace_id.clone(),
            iterations: state.current_iteration,
            hitl_required: state.hitl_required,
        });
        RunResult::from(state)
    }

    /// Run several requests concurrently against the same router and breakers.
    pub async fn run_batch(&self, requests: Vec<RunRequest>) -> Vec<RunResult> {
        join_all(requests.into_iter().map(|request| self.run(request))).await
    }

    /// Follow `next_agent` until the graph terminates. A turn budget bounds
    /// the loop; when it runs out the tail nodes are forced.
    pub async fn drive(&self, state: &mut OrchestratorState) {
        let budget = state.max_iterations.saturating_mul(4).saturating_add(8);
        let mut turns = 0u32;
        let mut forced_tail = false;

        while let Some(node) = state.next_agent {
            turns += 1;
            if turns > budget && !forced_tail && !node.is_tail() {
                warn!(trace_id = %state.trace_id, turns = turns, "Turn budget exhausted, forcing synthesis");
                forced_tail = true;
                state.next_agent = Some(NodeId::Synthesize);
                continue;
            }
            self.step(node, state).await;
        }
    }

    /// Execute one node.
    pub async fn step(&self, node: NodeId, state: &mut OrchestratorState) {
        debug!(trace_id = %state.trace_id, node = %node, "Entering node");
        self.events.publish(OrchestrationEvent::NodeEntered {
            trace_id: state.trace_id.clone(),
            node: node.to_string(),
        });
        let logged_decisions = state.routing_log.len();
        let active_before = state.in_progress_index();

        match node {
            NodeId::SupervisorPlan => self.supervisor().plan(state).await,
            NodeId::Specialist(role) => self.specialist(role).execute(state).await,
            NodeId::ExecutePlugin => PluginDispatcher::new(self.plugins.clone()).execute_plugin(state).await,
            NodeId::Synthesize => self.synthesizer().synthesize(state).await,
            NodeId::SafetyCheck => {
                SafetyGate::new(self.router.clone()).check(state).await;
                if let Some(ref verdict) = state.safety_verdict {
                    self.events.publish(OrchestrationEvent::SafetyChecked {
                        trace_id: state.trace_id.clone(),
                        action: verdict.action,
                    });
                }
            }
            NodeId::HitlGate => HitlGate::apply(state),
        }

        self.publish_task_changes(state, active_before);
        for decision in state.routing_log[logged_decisions..].iter().filter(|d| d.escalated) {
            self.events.publish(OrchestrationEvent::TierEscalated {
                trace_id: state.trace_id.clone(),
                from: decision.initial_tier,
                to: decision.final_tier,
                reason: decision.escalation_reason.clone(),
            });
        }
    }

    fn publish_task_changes(&self, state: &OrchestratorState, active_before: Option<usize>) {
        if let Some(i) = active_before {
            let task = &state.task_plan[i];
            if task.status.is_finished() {
                let success = match task.result {
                    Some(TaskResult::Plugin(ref out)) => out.success,
                    Some(TaskResult::Specialist(ref out)) => out.is_usable(),
                    None => false,
                };
                self.events.publish(OrchestrationEvent::TaskFinished {
                    trace_id: state.trace_id.clone(),
                    task_id: task.id.clone(),
                    success: success && task.status == TaskStatus::Completed,
                });
            }
        }
        if let Some(i) = state.in_progress_index() {
            if Some(i) != active_before {
                self.events.publish(OrchestrationEvent::TaskDispatched {
                    trace_id: state.trace_id.clone(),
                    task_id: state.task_plan[i].id.clone(),
                    assigned_agent: state.task_plan[i].assigned_agent(),
                });
            }
        }
    }

    fn supervisor(&self) -> Supervisor {
        let planner = Planner::new(self.router.clone()).with_context_chars(self.config.planner_context_chars);
        Supervisor::new(planner, self.plugins.clone())
    }

    fn specialist(&self, role: SpecialistRole) -> SpecialistAgent {
        SpecialistAgent::new(role, self.router.clone())
            .with_config(AgentConfig::new(role).with_context_chars(self.config.agent_context_chars))
            .with_research(self.research.clone())
    }

    fn synthesizer(&self) -> Synthesizer {
        Synthesizer::new(self.router.clone())
            .with_context_chars(self.config.synthesis_context_chars)
            .with_default_confidence(self.config.synthesis_confidence)
    }
}

impl Default for OrchestrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::state::SubTask;

    #[tokio::test]
    async fn test_run_without_provider_terminates() {
        let engine = OrchestrationEngine::new();
        let result = engine.run(RunRequest::new("What is our travel policy?", "acme")).await;

        assert_eq!(result.iterations, 1);
        assert_eq!(result.agents_used, vec!["researcher".to_string()]);
        assert_eq!(result.orchestration_pattern, OrchestrationPattern::SingleAgent);
        assert_eq!(result.confidence, 0.0);
        assert!(result.hitl_required);
        assert!(result.hitl_reason.unwrap().contains("Low confidence"));
        assert!(uuid::Uuid::parse_str(&result.trace_id).is_ok());
    }

    #[tokio::test]
    async fn test_zero_iterations_is_synthesis_only() {
        let engine = OrchestrationEngine::new();
        let result = engine
            .run(RunRequest::new("hello", "acme").with_max_iterations(0))
            .await;
        assert_eq!(result.iterations, 0);
        assert_eq!(result.orchestration_pattern, OrchestrationPattern::SynthesisOnly);
        assert!(result.safety_verdict.is_some());
    }

    #[test]
    fn test_pattern_classification() {
        let mut state = OrchestratorState::new("q", "t");
        state.task_plan = vec![
            SubTask::new("t1", "a", AgentTarget::parse("coder", None, None)),
            SubTask::new("t2", "b", AgentTarget::parse("reviewer", None, None)),
        ];
        state.task_plan[0].status = TaskStatus::Completed;
        assert_eq!(OrchestrationPattern::classify(&state), OrchestrationPattern::SingleAgent);

        state.task_plan[1].status = TaskStatus::Completed;
        assert_eq!(OrchestrationPattern::classify(&state), OrchestrationPattern::MultiAgent);

        state.task_plan.push(SubTask::new("t3", "c", AgentTarget::parse("plugin:calculator", None, None)));
        state.task_plan[2].status = TaskStatus::Failed;
        assert_eq!(OrchestrationPattern::classify(&state), OrchestrationPattern::PluginAugmented);
    }

    #[tokio::test]
    async fn test_specialist_without_task_still_terminates() {
        let engine = OrchestrationEngine::new();
        let mut state = engine.initial_state(RunRequest::new("q", "t").with_max_iterations(0));
        state.next_agent = Some(NodeId::Specialist(SpecialistRole::Growth));
        engine.drive(&mut state).await;

        assert!(state.next_agent.is_none());
        assert!(state.safety_verdict.is_some());
    }

    #[tokio::test]
    async fn test_events_cover_run() {
        let engine = OrchestrationEngine::new();
        let mut rx = engine.subscribe();
        engine.run(RunRequest::new("q", "t")).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                OrchestrationEvent::RunStarted { .. } => "run_started",
                OrchestrationEvent::NodeEntered { .. } => "node",
                OrchestrationEvent::TaskDispatched { .. } => "dispatched",
                OrchestrationEvent::TaskFinished { .. } => "finished",
                OrchestrationEvent::TierEscalated { .. } => "escalated",
                OrchestrationEvent::SafetyChecked { .. } => "safety",
                OrchestrationEvent::RunFinished { .. } => "run_finished",
            });
        }
        assert_eq!(kinds.first(), Some(&"run_started"));
        assert_eq!(kinds.last(), Some(&"run_finished"));
        assert!(kinds.contains(&"dispatched"));
        assert!(kinds.contains(&"finished"));
        assert!(kinds.contains(&"safety"));
    }
}
