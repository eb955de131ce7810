//! Orchestration Event Bus
//!
//! Per-engine pub/sub for run telemetry. Publishing without subscribers is a no-op.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::routing::ModelTier;
use crate::safety::SafetyAction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OrchestrationEvent {
    RunStarted { trace_id: String, tenant_id: String },
    NodeEntered { trace_id: String, node: String },
    TaskDispatched { trace_id: String, task_id: String, assigned_agent: String },
    TaskFinished { trace_id: String, task_id: String, success: bool },
    TierEscalated { trace_id: String, from: ModelTier, to: ModelTier, reason: Option<String> },
    SafetyChecked { trace_id: String, action: SafetyAction },
    RunFinished { trace_id: String, iterations: u32, hitl_required: bool },
}

pub struct EventBus {
    tx: broadcast::Sender<OrchestrationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: OrchestrationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(OrchestrationEvent::NodeEntered {
            trace_id: "t".to_string(),
            node: "synthesize".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, OrchestrationEvent::NodeEntered { ref node, .. } if node == "synthesize"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(OrchestrationEvent::RunStarted {
            trace_id: "t".to_string(),
            tenant_id: "acme".to_string(),
        });
    }
}
