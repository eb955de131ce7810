//! Plugin System Module
//!
//! External tools the planner can route sub-tasks to. Plugins are invoked
//! by name and action with JSON parameters and always answer with a
//! [`PluginOutput`].

mod calculator;

pub use calculator::CalculatorPlugin;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Output from a plugin execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginOutput {
    pub success: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginOutput {
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: data.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// A single external tool.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// Actions this plugin understands.
    fn actions(&self) -> Vec<String>;

    /// JSON schema for the parameters.
    fn parameters(&self) -> Value;

    async fn execute(&self, action: &str, params: Value) -> Result<PluginOutput>;
}

/// The seam the orchestrator dispatches plugin tasks through.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn execute(&self, name: &str, action: &str, params: Value) -> Result<PluginOutput>;

    /// Human-readable listing of available plugins for the planner prompt.
    async fn catalogue(&self) -> String;
}

/// In-process plugin registry.
#[derive(Default)]
pub struct PluginHost {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_instance<P: Plugin + 'static>(&self, plugin: P) {
        let mut plugins = self.plugins.write().await;
        plugins.insert(plugin.name(), Arc::new(plugin));
    }

    pub async fn plugin_names(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        let mut names: Vec<String> = plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let plugins = self.plugins.read().await;
        plugins.get(name).cloned()
    }
}

#[async_trait]
impl PluginRegistry for PluginHost {
    async fn execute(&self, name: &str, action: &str, params: Value) -> Result<PluginOutput> {
        let plugin = self.get_plugin(name).await;
        match plugin {
            Some(plugin) => {
                if !plugin.actions().iter().any(|a| a == action) {
                    return Ok(PluginOutput::failure(format!(
                        "Plugin '{}' has no action '{}'",
                        name, action
                    )));
                }
                tracing::debug!(plugin = name, action = action, "Executing plugin");
                plugin.execute(action, params).await
            }
            None => Ok(PluginOutput::failure(format!("Unknown plugin: {}", name))),
        }
    }

    async fn catalogue(&self) -> String {
        let plugins = self.plugins.read().await;
        if plugins.is_empty() {
            return "No plugins available.\n".to_string();
        }

        let mut names: Vec<_> = plugins.keys().collect();
        names.sort();

        let mut out = String::from("Available plugins (assign as \"plugin:<name>\"):\n");
        for name in names {
            let plugin = &plugins[name];
            out.push_str(&format!(
                "- {}: {} (actions: {}; params: {})\n",
                name,
                plugin.description(),
                plugin.actions().join(", "),
                serde_json::to_string(&plugin.parameters()).unwrap_or_default()
            ));
        }
        out
    }
}
