//! Routing Module
//!
//! Tier selection, circuit breaking and escalation for every LLM call.

pub mod circuit_breaker;
pub mod complexity;
pub mod router;
pub mod tier;

pub use circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitBreakerState, CircuitState};
pub use complexity::{ComplexityAnalyzer, ComplexityFeatures, TierThresholds};
pub use router::{
    assess_confidence, RouteRequest, RoutedResponse, RouterConfig, RouterError, RoutingDecision, TierModel,
    TierTable, TieredRouter, DEFAULT_PROVIDER,
};
pub use tier::{ModelTier, TaskType};
