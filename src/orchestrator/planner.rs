//! Task Planner
//!
//! Decomposes a query into sub-tasks via one LLM call and parses the
//! resulting JSON plan. Any failure yields the single-researcher fallback.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::{AgentTarget, OrchestratorState, SubTask, TaskResult};
use crate::agent::SpecialistRole;
use crate::routing::{RouteRequest, TieredRouter};
use crate::utils::{extract_json, truncate_chars};

const PLAN_KEYS: [&str; 4] = ["tasks", "subtasks", "plan", "steps"];

pub struct Planner {
    router: Option<Arc<TieredRouter>>,
    context_chars: usize,
}

impl Planner {
    pub fn new(router: Option<Arc<TieredRouter>>) -> Self {
        Self {
            router,
            context_chars: 2000,
        }
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    /// Build a plan for the state's query. Never fails.
    pub async fn decompose(&self, state: &mut OrchestratorState, plugin_catalogue: &str) -> Vec<SubTask> {
        let Some(ref router) = self.router else {
            debug!("No LLM provider for planning, using fallback plan");
            return fallback_plan(&state.user_query);
        };

        let prompt = self.build_prompt(state, plugin_catalogue);
        let request = RouteRequest::new(prompt)
            .with_system("You are the supervisor of a team of specialist agents. You break requests into small, ordered sub-tasks and output JSON only.")
            .with_temperature(0.2)
            .with_max_tokens(1024)
            .classify_on(state.user_query.clone());

        match router.route(request).await {
            Ok(routed) => {
                state.record_llm_call(&routed);
                match parse_plan(&routed.response.text) {
                    Some(tasks) => {
                        info!(tasks = tasks.len(), tier = %routed.decision.final_tier, "Created task plan");
                        tasks
                    }
                    None => {
                        warn!("Planner response was not a usable plan, using fallback");
                        fallback_plan(&state.user_query)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Planning call failed, using fallback plan");
                fallback_plan(&state.user_query)
            }
        }
    }

    fn build_prompt(&self, state: &OrchestratorState, plugin_catalogue: &str) -> String {
        let mut specialists = String::new();
        for role in SpecialistRole::ALL {
            specialists.push_str(&format!("- {}: {}\n", role, role.describe()));
        }

        let prior = if state.agent_outputs.is_empty() {
            "None".to_string()
        } else {
            let rendered: Vec<String> = state
                .agent_outputs
                .iter()
                .map(|(key, result)| {
                    let body = match result {
                        TaskResult::Specialist(output) => serde_json::to_string(&output.payload),
                        TaskResult::Plugin(output) => serde_json::to_string(output),
                    };
                    format!("{}: {}", key, body.unwrap_or_default())
                })
                .collect();
            truncate_chars(&rendered.join("\n"), self.context_chars)
        };

        format!(
            r#"Decompose the user request into 1-5 sub-tasks.

USER REQUEST:
{query}

PRIOR OUTPUTS:
{prior}

SPECIALISTS:
{specialists}
{plugins}
Respond with JSON only:
{{"tasks": [{{"id": "t1", "description": string, "assigned_agent": "<specialist>" | "plugin:<name>", "depends_on": [string], "plugin_action": string, "plugin_params": object}}]}}
Use plugin_action and plugin_params only for plugin tasks. Prefer the fewest tasks that fully answer the request."#,
            query = state.user_query,
            prior = prior,
            specialists = specialists,
            plugins = plugin_catalogue,
        )
    }
}

/// The plan used whenever decomposition is impossible.
pub fn fallback_plan(user_query: &str) -> Vec<SubTask> {
    vec![SubTask::new(
        "t1",
        user_query,
        AgentTarget::Specialist {
            role: SpecialistRole::Researcher,
        },
    )]
}

/// Parse a planner response. Returns `None` when no non-empty task list is found.
pub fn parse_plan(response: &str) -> Option<Vec<SubTask>> {
    let items = plan_items(response)?;

    let mut used: HashSet<String> = HashSet::new();
    // Planner id -> assigned id of the first task that declared it.
    let mut renamed: HashMap<String, String> = HashMap::new();
    let mut next_seq = 1usize;
    let mut tasks = Vec::with_capacity(items.len());

    for item in items.iter().filter(|v| v.is_object()) {
        let description = item["description"]
            .as_str()
            .or_else(|| item["desc"].as_str())
            .or_else(|| item["task"].as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if description.is_empty() {
            continue;
        }

        let assigned = item["assigned_agent"]
            .as_str()
            .or_else(|| item["agent"].as_str())
            .unwrap_or("researcher");
        let target = AgentTarget::parse(
            assigned,
            item["plugin_action"].as_str(),
            item.get("plugin_params").filter(|p| p.is_object()).cloned(),
        );

        let declared = item["id"].as_str().map(str::trim).filter(|s| !s.is_empty());
        let id = match declared {
            Some(id) if !used.contains(id) => id.to_string(),
            _ => loop {
                let candidate = format!("t{}", next_seq);
                next_seq += 1;
                if !used.contains(&candidate) {
                    break candidate;
                }
            },
        };
        used.insert(id.clone());
        if let Some(declared) = declared {
            renamed.entry(declared.to_string()).or_insert_with(|| id.clone());
        }

        let mut task = SubTask::new(id, description, target);
        task.depends_on = item["depends_on"]
            .as_array()
            .map(|deps| deps.iter().filter_map(|d| d.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        tasks.push(task);
    }

    if tasks.is_empty() {
        return None;
    }
    for task in tasks.iter_mut() {
        for dep in task.depends_on.iter_mut() {
            if let Some(id) = renamed.get(dep.as_str()) {
                *dep = id.clone();
            }
        }
    }
    Some(tasks)
}

fn plan_items(response: &str) -> Option<Vec<Value>> {
    if let Some(value) = extract_json(response) {
        for key in PLAN_KEYS {
            if let Some(items) = value.get(key).and_then(Value::as_array) {
                return Some(items.clone());
            }
        }
    }

    // Bare top-level array.
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&response[start..=end])
        .ok()?
        .as_array()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{LLMConfig, LLMProvider, LLMResponse, ProviderError};
    use crate::orchestrator::state::TaskStatus;
    use crate::routing::ModelTier;
    use async_trait::async_trait;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_plan() {
        let response = r#"Here is my plan:
```json
{"tasks": [
  {"id": "t1", "description": "Find Q3 revenue", "assigned_agent": "researcher"},
  {"id": "t2", "description": "Compute growth", "assigned_agent": "plugin:calculator",
   "plugin_action": "evaluate", "plugin_params": {"expression": "(4.2-3.5)/3.5*100"}, "depends_on": ["t1"]}
]}
```"#;
        let tasks = parse_plan(response).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].assigned_agent(), "researcher");
        assert_eq!(tasks[1].assigned_agent(), "plugin:calculator");
        assert_eq!(tasks[1].depends_on, vec!["t1".to_string()]);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
        match &tasks[1].target {
            AgentTarget::Plugin { action, params, .. } => {
                assert_eq!(action, "evaluate");
                assert_eq!(params["expression"], json!("(4.2-3.5)/3.5*100"));
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_duplicate_ids_are_assigned() {
        let response = r#"{"tasks": [
            {"description": "a", "assigned_agent": "coder"},
            {"id": "t1", "description": "b", "assigned_agent": "reviewer"},
            {"id": "t1", "description": "c", "assigned_agent": "risk"}
        ]}"#;
        let ids: Vec<String> = parse_plan(response).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_dependencies_follow_reassigned_ids() {
        let response = r#"{"tasks": [
            {"description": "gather figures", "assigned_agent": "researcher"},
            {"id": "t1", "description": "review figures", "assigned_agent": "reviewer"},
            {"id": "t9", "description": "assess exposure", "assigned_agent": "risk", "depends_on": ["t1", "x"]}
        ]}"#;
        let tasks = parse_plan(response).unwrap();
        assert_eq!(tasks[1].id, "t2");
        assert_eq!(tasks[2].id, "t9");
        assert_eq!(tasks[2].depends_on, vec!["t2".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_bare_array_plan() {
        let response = r#"[{"description": "assess exposure", "agent": "risk"}]"#;
        let tasks = parse_plan(response).unwrap();
        assert_eq!(tasks[0].id, "t1");
        assert_eq!(tasks[0].assigned_agent(), "risk");
    }

    #[test]
    fn test_unusable_responses() {
        assert!(parse_plan("I will research this for you.").is_none());
        assert!(parse_plan(r#"{"tasks": []}"#).is_none());
        assert!(parse_plan(r#"{"tasks": [{"assigned_agent": "coder"}]}"#).is_none());
    }

    #[test]
    fn test_fallback_plan_shape() {
        let tasks = fallback_plan("What is our refund policy?");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t1");
        assert_eq!(tasks[0].description, "What is our refund policy?");
        assert_eq!(tasks[0].assigned_agent(), "researcher");
    }

    struct RecordingProvider {
        tiers: std::sync::Mutex<Vec<ModelTier>>,
    }

    #[async_trait]
    impl LLMProvider for RecordingProvider {
        async fn generate(&self, _prompt: &str, config: &LLMConfig) -> Result<LLMResponse, ProviderError> {
            self.tiers.lock().unwrap().push(config.tier);
            Ok(LLMResponse {
                text: r#"{"tasks": [{"description": "greet the user", "assigned_agent": "researcher"}]}"#.to_string(),
                tier: config.tier,
                input_tokens: 0,
                output_tokens: 0,
                latency_ms: 1,
                cost_usd: 0.0,
            })
        }
    }

    #[tokio::test]
    async fn test_tier_follows_user_query_not_template() {
        let provider = Arc::new(RecordingProvider {
            tiers: std::sync::Mutex::new(Vec::new()),
        });
        let planner = Planner::new(Some(Arc::new(TieredRouter::new(provider.clone()))));
        let mut state = OrchestratorState::new("hi", "t");

        let tasks = planner.decompose(&mut state, "No plugins available.\n").await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(*provider.tiers.lock().unwrap(), vec![ModelTier::Tiny]);
        let decision = &state.routing_log[0];
        assert_eq!(decision.initial_tier, ModelTier::Tiny);
        assert_eq!(decision.task_type_detected, "general");
    }

    #[tokio::test]
    async fn test_decompose_without_router_falls_back() {
        let planner = Planner::new(None);
        let mut state = OrchestratorState::new("Summarize the contract", "t");
        let tasks = planner.decompose(&mut state, "").await;
        assert_eq!(tasks, fallback_plan("Summarize the contract"));
    }
}
