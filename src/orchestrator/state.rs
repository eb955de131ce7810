//! Task model and the per-run orchestration state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::agent::{AgentOutput, Citation, SpecialistRole};
use crate::routing::{RoutedResponse, RoutingDecision};
use crate::safety::SafetyVerdict;
use crate::tools::PluginOutput;

pub const PLUGIN_PREFIX: &str = "plugin:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Who executes a sub-task. Parsed once when the plan is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentTarget {
    Specialist {
        role: SpecialistRole,
    },
    Plugin {
        name: String,
        action: String,
        params: Value,
    },
}

impl AgentTarget {
    /// Parse a planner-supplied `assigned_agent`. Unknown specialist names
    /// fall back to the researcher.
    pub fn parse(assigned: &str, action: Option<&str>, params: Option<Value>) -> Self {
        let assigned = assigned.trim();
        if let Some(name) = assigned.strip_prefix(PLUGIN_PREFIX) {
            return AgentTarget::Plugin {
                name: name.trim().to_string(),
                action: action.unwrap_or("execute").to_string(),
                params: params.unwrap_or(Value::Object(Default::default())),
            };
        }

        let role = SpecialistRole::from_name(assigned).unwrap_or_else(|| {
            warn!(assigned_agent = assigned, "Unknown specialist in plan, assigning researcher");
            SpecialistRole::Researcher
        });
        AgentTarget::Specialist { role }
    }

    /// The `assigned_agent` string form: a role name or `plugin:<name>`.
    pub fn label(&self) -> String {
        match self {
            AgentTarget::Specialist { role } => role.name().to_string(),
            AgentTarget::Plugin { name, .. } => format!("{}{}", PLUGIN_PREFIX, name),
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            AgentTarget::Specialist { role } => NodeId::Specialist(*role),
            AgentTarget::Plugin { .. } => NodeId::ExecutePlugin,
        }
    }
}

/// Output of whichever executor finished a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    Specialist(AgentOutput),
    Plugin(PluginOutput),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub description: String,
    pub target: AgentTarget,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    /// Declared by the planner; the scheduler runs tasks in insertion order.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl SubTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>, target: AgentTarget) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            target,
            status: TaskStatus::Pending,
            result: None,
            depends_on: Vec::new(),
        }
    }

    pub fn assigned_agent(&self) -> String {
        self.target.label()
    }
}

/// Nodes of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    SupervisorPlan,
    Specialist(SpecialistRole),
    ExecutePlugin,
    Synthesize,
    SafetyCheck,
    HitlGate,
}

impl NodeId {
    /// Nodes that always run after the task loop, in order.
    pub fn is_tail(&self) -> bool {
        matches!(self, NodeId::Synthesize | NodeId::SafetyCheck | NodeId::HitlGate)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::SupervisorPlan => f.write_str("supervisor_plan"),
            NodeId::Specialist(role) => f.write_str(role.name()),
            NodeId::ExecutePlugin => f.write_str("execute_plugin"),
            NodeId::Synthesize => f.write_str("synthesize"),
            NodeId::SafetyCheck => f.write_str("safety_check"),
            NodeId::HitlGate => f.write_str("hitl_gate"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentContext {
    #[default]
    General,
    CustomerSupport,
    Internal,
    HrScreening,
    Financial,
    Legal,
}

impl DeploymentContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentContext::General => "general",
            DeploymentContext::CustomerSupport => "customer_support",
            DeploymentContext::Internal => "internal",
            DeploymentContext::HrScreening => "hr_screening",
            DeploymentContext::Financial => "financial",
            DeploymentContext::Legal => "legal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "general" => Some(DeploymentContext::General),
            "customer_support" => Some(DeploymentContext::CustomerSupport),
            "internal" => Some(DeploymentContext::Internal),
            "hr_screening" => Some(DeploymentContext::HrScreening),
            "financial" => Some(DeploymentContext::Financial),
            "legal" => Some(DeploymentContext::Legal),
            _ => None,
        }
    }

    /// Contexts where every answer needs human sign-off.
    pub fn requires_review(&self) -> bool {
        matches!(
            self,
            DeploymentContext::HrScreening | DeploymentContext::Financial | DeploymentContext::Legal
        )
    }
}

impl fmt::Display for DeploymentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable workflow context threaded through every node of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub trace_id: String,
    pub user_query: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub deployment_context: DeploymentContext,
    pub task_plan: Vec<SubTask>,
    pub current_iteration: u32,
    pub max_iterations: u32,
    /// Specialist results are keyed by role name, plugin results by task id.
    pub agent_outputs: BTreeMap<String, TaskResult>,
    pub citations: Vec<Citation>,
    pub final_answer: String,
    pub confidence: f32,
    pub safety_verdict: Option<SafetyVerdict>,
    pub hitl_required: bool,
    pub hitl_reason: Option<String>,
    pub cost_accumulated_usd: f64,
    pub next_agent: Option<NodeId>,
    pub agents_used: Vec<String>,
    pub routing_log: Vec<RoutingDecision>,
}

impl OrchestratorState {
    pub fn new(user_query: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            user_query: user_query.into(),
            tenant_id: tenant_id.into(),
            user_id: None,
            deployment_context: DeploymentContext::default(),
            task_plan: Vec::new(),
            current_iteration: 0,
            max_iterations: 10,
            agent_outputs: BTreeMap::new(),
            citations: Vec::new(),
            final_answer: String::new(),
            confidence: 0.0,
            safety_verdict: None,
            hitl_required: false,
            hitl_reason: None,
            cost_accumulated_usd: 0.0,
            next_agent: Some(NodeId::SupervisorPlan),
            agents_used: Vec::new(),
            routing_log: Vec::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_deployment_context(mut self, context: DeploymentContext) -> Self {
        self.deployment_context = context;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn in_progress_index(&self) -> Option<usize> {
        self.task_plan.iter().position(|t| t.status == TaskStatus::InProgress)
    }

    pub fn first_pending_index(&self) -> Option<usize> {
        self.task_plan.iter().position(|t| t.status == TaskStatus::Pending)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.task_plan.iter().filter(|t| t.status == status).count()
    }

    /// Close the task at `index` with its result. Finished tasks are left alone.
    pub fn finish_task(&mut self, index: usize, result: TaskResult, failed: bool) {
        if let Some(task) = self.task_plan.get_mut(index) {
            if task.status.is_finished() {
                return;
            }
            task.status = if failed { TaskStatus::Failed } else { TaskStatus::Completed };
            task.result = Some(result);
        }
    }

    pub fn mark_agent_used(&mut self, label: &str) {
        if !self.agents_used.iter().any(|a| a == label) {
            self.agents_used.push(label.to_string());
        }
    }

    /// Book the cost and routing decision of an LLM call.
    pub fn record_llm_call(&mut self, routed: &RoutedResponse) {
        self.cost_accumulated_usd += routed.total_cost_usd;
        self.routing_log.push(routed.decision.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_parsing() {
        let target = AgentTarget::parse("plugin:calculator", Some("evaluate"), Some(json!({"expression": "1+1"})));
        assert_eq!(target.label(), "plugin:calculator");
        assert_eq!(target.node(), NodeId::ExecutePlugin);

        let target = AgentTarget::parse("Coder", None, None);
        assert_eq!(target, AgentTarget::Specialist { role: SpecialistRole::Coder });

        let target = AgentTarget::parse("astrologer", None, None);
        assert_eq!(target.node(), NodeId::Specialist(SpecialistRole::Researcher));
    }

    #[test]
    fn test_plugin_target_defaults() {
        match AgentTarget::parse("plugin: weather ", None, None) {
            AgentTarget::Plugin { name, action, params } => {
                assert_eq!(name, "weather");
                assert_eq!(action, "execute");
                assert_eq!(params, json!({}));
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_finish_task_is_not_repeated() {
        let mut state = OrchestratorState::new("q", "tenant");
        state.task_plan.push(SubTask::new("t1", "calc", AgentTarget::parse("plugin:calculator", None, None)));
        state.task_plan[0].status = TaskStatus::InProgress;

        state.finish_task(0, TaskResult::Plugin(PluginOutput::success(json!(1))), false);
        state.finish_task(0, TaskResult::Plugin(PluginOutput::failure("late")), true);

        assert_eq!(state.task_plan[0].status, TaskStatus::Completed);
        assert_eq!(state.task_plan[0].result, Some(TaskResult::Plugin(PluginOutput::success(json!(1)))));
    }

    #[test]
    fn test_node_names() {
        assert_eq!(NodeId::SupervisorPlan.to_string(), "supervisor_plan");
        assert_eq!(NodeId::Specialist(SpecialistRole::Risk).to_string(), "risk");
        assert!(NodeId::HitlGate.is_tail());
        assert!(!NodeId::ExecutePlugin.is_tail());
    }

    #[test]
    fn test_deployment_context_review() {
        assert!(DeploymentContext::Legal.requires_review());
        assert!(!DeploymentContext::General.requires_review());
        assert_eq!(DeploymentContext::from_name("hr_screening"), Some(DeploymentContext::HrScreening));
    }

    #[test]
    fn test_new_state_starts_at_supervisor() {
        let state = OrchestratorState::new("q", "tenant").with_max_iterations(3);
        assert_eq!(state.next_agent, Some(NodeId::SupervisorPlan));
        assert_eq!(state.max_iterations, 3);
        assert!(uuid::Uuid::parse_str(&state.trace_id).is_ok());
    }
}
