//! Agency Orchestrator
//!
//! Task orchestration and tiered LLM dispatch for an enterprise
//! query-answering platform:
//! - Supervisor state machine over specialist agents and plugins
//! - Complexity-based tier routing with circuit breakers and escalation
//! - Safety and human-review gates on every answer

pub mod agent;
pub mod config;
pub mod orchestrator;
pub mod routing;
pub mod safety;
pub mod tools;
pub mod utils;

// Re-exports for convenience
pub use agent::{LLMProvider, SpecialistRole};
pub use config::{ConfigManager, OrchestratorConfig};
pub use orchestrator::{OrchestrationEngine, RunRequest, RunResult};
pub use routing::{ModelTier, TieredRouter};
pub use tools::{PluginHost, PluginRegistry};
