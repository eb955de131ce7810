//! Plugin Dispatcher
//!
//! Executes the in-progress plugin task through the registry. Registry
//! errors become `success: false` results; nothing propagates.

use std::sync::Arc;
use tracing::{info, warn};

use super::state::{AgentTarget, NodeId, OrchestratorState, TaskResult};
use crate::tools::{PluginOutput, PluginRegistry};

pub struct PluginDispatcher {
    registry: Arc<dyn PluginRegistry>,
}

impl PluginDispatcher {
    pub fn new(registry: Arc<dyn PluginRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute_plugin(&self, state: &mut OrchestratorState) {
        state.next_agent = Some(NodeId::SupervisorPlan);

        let Some(index) = state.in_progress_index() else {
            warn!("Plugin dispatcher entered without an in-progress task");
            return;
        };
        let task = &state.task_plan[index];
        let AgentTarget::Plugin { name, action, params } = &task.target else {
            warn!(task_id = %task.id, "In-progress task is not a plugin task");
            return;
        };
        let (task_id, name, action, params) = (task.id.clone(), name.clone(), action.clone(), params.clone());

        let output = match self.registry.execute(&name, &action, params).await {
            Ok(output) => output,
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin registry error");
                PluginOutput::failure(e.to_string())
            }
        };
        info!(
            trace_id = %state.trace_id,
            task_id = %task_id,
            plugin = %name,
            success = output.success,
            "Plugin finished"
        );

        let result = TaskResult::Plugin(output);
        state.finish_task(index, result.clone(), false);
        state.agent_outputs.insert(task_id, result);
        state.mark_agent_used(&format!("plugin:{}", name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::state::{SubTask, TaskStatus};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedRegistry;

    #[async_trait]
    impl PluginRegistry for FixedRegistry {
        async fn execute(&self, name: &str, _action: &str, _params: Value) -> Result<PluginOutput> {
            match name {
                "calculator" => Ok(PluginOutput::success(json!({"result": 100}))),
                _ => anyhow::bail!("registry offline"),
            }
        }

        async fn catalogue(&self) -> String {
            String::new()
        }
    }

    fn plugin_state(assigned: &str) -> OrchestratorState {
        let mut state = OrchestratorState::new("What is 50*2?", "t");
        state.task_plan.push(SubTask::new(
            "t1",
            "multiply",
            AgentTarget::parse(assigned, Some("evaluate"), Some(json!({"expression": "50*2"}))),
        ));
        state.task_plan[0].status = TaskStatus::InProgress;
        state
    }

    #[tokio::test]
    async fn test_result_keyed_by_task_id() {
        let dispatcher = PluginDispatcher::new(Arc::new(FixedRegistry));
        let mut state = plugin_state("plugin:calculator");
        dispatcher.execute_plugin(&mut state).await;

        assert_eq!(state.task_plan[0].status, TaskStatus::Completed);
        match state.agent_outputs.get("t1") {
            Some(TaskResult::Plugin(out)) => assert_eq!(out.data["result"], 100),
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(state.next_agent, Some(NodeId::SupervisorPlan));
    }

    #[tokio::test]
    async fn test_registry_error_is_contained() {
        let dispatcher = PluginDispatcher::new(Arc::new(FixedRegistry));
        let mut state = plugin_state("plugin:weather");
        dispatcher.execute_plugin(&mut state).await;

        assert_eq!(state.task_plan[0].status, TaskStatus::Completed);
        match state.agent_outputs.get("t1") {
            Some(TaskResult::Plugin(out)) => {
                assert!(!out.success);
                assert_eq!(out.error.as_deref(), Some("registry offline"));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_plugin_task_is_left_alone() {
        let dispatcher = PluginDispatcher::new(Arc::new(FixedRegistry));
        let mut state = plugin_state("coder");
        dispatcher.execute_plugin(&mut state).await;

        assert_eq!(state.task_plan[0].status, TaskStatus::InProgress);
        assert!(state.agent_outputs.is_empty());
        assert_eq!(state.next_agent, Some(NodeId::SupervisorPlan));
    }
}
