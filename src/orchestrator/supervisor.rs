//! Supervisor
//!
//! Plans on first entry, then hands out pending tasks one at a time in plan
//! order until the plan is exhausted or the iteration cap is reached.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::planner::Planner;
use super::state::{AgentTarget, NodeId, OrchestratorState, TaskResult, TaskStatus};
use crate::agent::AgentOutput;
use crate::tools::{PluginOutput, PluginRegistry};

pub struct Supervisor {
    planner: Planner,
    plugins: Arc<dyn PluginRegistry>,
}

impl Supervisor {
    pub fn new(planner: Planner, plugins: Arc<dyn PluginRegistry>) -> Self {
        Self { planner, plugins }
    }

    pub async fn plan(&self, state: &mut OrchestratorState) {
        self.abandon_stale_task(state);

        if state.task_plan.is_empty() {
            if state.current_iteration >= state.max_iterations {
                info!(
                    iteration = state.current_iteration,
                    max = state.max_iterations,
                    "Iteration cap reached before planning"
                );
                state.next_agent = Some(NodeId::Synthesize);
                return;
            }
            let catalogue = self.plugins.catalogue().await;
            state.task_plan = self.planner.decompose(state, &catalogue).await;
        }

        let Some(index) = state.first_pending_index() else {
            debug!("No pending tasks, moving to synthesis");
            state.next_agent = Some(NodeId::Synthesize);
            return;
        };

        if state.current_iteration >= state.max_iterations {
            info!(
                pending = state.count_with_status(TaskStatus::Pending),
                max = state.max_iterations,
                "Iteration cap reached, skipping remaining tasks"
            );
            state.next_agent = Some(NodeId::Synthesize);
            return;
        }

        let task = &mut state.task_plan[index];
        task.status = TaskStatus::InProgress;
        let next = task.target.node();
        info!(
            trace_id = %state.trace_id,
            task_id = %task.id,
            assigned_agent = %task.assigned_agent(),
            "Dispatching task"
        );
        state.current_iteration += 1;
        state.next_agent = Some(next);
    }

    /// A task still in progress when control returns here never reported
    /// back; close it as failed so only one task is ever active.
    fn abandon_stale_task(&self, state: &mut OrchestratorState) {
        let Some(index) = state.in_progress_index() else {
            return;
        };
        let task = &state.task_plan[index];
        warn!(task_id = %task.id, "Task left in progress, marking failed");
        let result = match task.target {
            AgentTarget::Specialist { role } => {
                TaskResult::Specialist(AgentOutput::unavailable(role, "executor did not report a result"))
            }
            AgentTarget::Plugin { .. } => {
                TaskResult::Plugin(PluginOutput::failure("executor did not report a result"))
            }
        };
        state.finish_task(index, result, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SpecialistRole;
    use crate::orchestrator::state::SubTask;
    use crate::tools::PluginHost;

    fn supervisor() -> Supervisor {
        Supervisor::new(Planner::new(None), Arc::new(PluginHost::new()))
    }

    fn task(id: &str, assigned: &str) -> SubTask {
        SubTask::new(id, format!("do {}", id), AgentTarget::parse(assigned, None, None))
    }

    #[tokio::test]
    async fn test_plans_and_dispatches_first_task() {
        let sup = supervisor();
        let mut state = OrchestratorState::new("What changed in the policy?", "t");
        sup.plan(&mut state).await;

        assert_eq!(state.task_plan.len(), 1);
        assert_eq!(state.task_plan[0].status, TaskStatus::InProgress);
        assert_eq!(state.next_agent, Some(NodeId::Specialist(SpecialistRole::Researcher)));
        assert_eq!(state.current_iteration, 1);
    }

    #[tokio::test]
    async fn test_fifo_ignores_dependencies() {
        let sup = supervisor();
        let mut state = OrchestratorState::new("q", "t");
        let mut first = task("t1", "coder");
        first.depends_on = vec!["t2".to_string()];
        state.task_plan = vec![first, task("t2", "plugin:calculator")];

        sup.plan(&mut state).await;
        assert_eq!(state.task_plan[0].status, TaskStatus::InProgress);
        assert_eq!(state.next_agent, Some(NodeId::Specialist(SpecialistRole::Coder)));
    }

    #[tokio::test]
    async fn test_completed_plan_routes_to_synthesis_repeatedly() {
        let sup = supervisor();
        let mut state = OrchestratorState::new("q", "t");
        state.task_plan = vec![task("t1", "coder"), task("t2", "risk")];
        for t in state.task_plan.iter_mut() {
            t.status = TaskStatus::Completed;
        }

        for _ in 0..3 {
            sup.plan(&mut state).await;
            assert_eq!(state.next_agent, Some(NodeId::Synthesize));
        }
        assert_eq!(state.current_iteration, 0);
    }

    #[tokio::test]
    async fn test_iteration_cap_forces_synthesis() {
        let sup = supervisor();
        let mut state = OrchestratorState::new("q", "t").with_max_iterations(1);
        state.task_plan = vec![task("t1", "coder"), task("t2", "reviewer")];

        sup.plan(&mut state).await;
        assert_eq!(state.current_iteration, 1);
        state.task_plan[0].status = TaskStatus::Completed;

        sup.plan(&mut state).await;
        assert_eq!(state.next_agent, Some(NodeId::Synthesize));
        assert_eq!(state.task_plan[1].status, TaskStatus::Pending);
        assert!(state.current_iteration <= state.max_iterations);
    }

    #[tokio::test]
    async fn test_cap_skips_planning() {
        let sup = supervisor();
        let mut state = OrchestratorState::new("q", "t").with_max_iterations(0);
        sup.plan(&mut state).await;
        assert!(state.task_plan.is_empty());
        assert_eq!(state.next_agent, Some(NodeId::Synthesize));
    }

    #[tokio::test]
    async fn test_stale_task_is_failed_before_dispatch() {
        let sup = supervisor();
        let mut state = OrchestratorState::new("q", "t");
        state.task_plan = vec![task("t1", "plugin:calculator"), task("t2", "coder")];
        state.task_plan[0].status = TaskStatus::InProgress;

        sup.plan(&mut state).await;
        assert_eq!(state.task_plan[0].status, TaskStatus::Failed);
        assert_eq!(state.task_plan[1].status, TaskStatus::InProgress);
        assert_eq!(state.count_with_status(TaskStatus::InProgress), 1);
    }
}
