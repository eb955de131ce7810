//! Orchestrator Module
//!
//! Decomposes a query into sub-tasks, routes each one to a specialist or a
//! plugin, and drives the run through synthesis, safety and review gates.

pub mod dispatcher;
pub mod engine;
pub mod event_bus;
pub mod planner;
pub mod state;
pub mod supervisor;
pub mod synthesizer;

pub use dispatcher::PluginDispatcher;
pub use engine::{OrchestrationEngine, OrchestrationPattern, RunRequest, RunResult};
pub use event_bus::{EventBus, OrchestrationEvent};
pub use planner::{fallback_plan, parse_plan, Planner};
pub use state::{
    AgentTarget, DeploymentContext, NodeId, OrchestratorState, SubTask, TaskResult, TaskStatus, PLUGIN_PREFIX,
};
pub use supervisor::Supervisor;
pub use synthesizer::Synthesizer;
