//! Agency Orchestrator CLI
//!
//! Runs one query from the command line, or an interactive loop when no
//! query is given. Configuration comes from `agency_config.json` (created
//! with defaults on first run) and `AGENCY_*` environment variables.

use anyhow::Result;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agency_orchestrator::orchestrator::DeploymentContext;
use agency_orchestrator::tools::CalculatorPlugin;
use agency_orchestrator::{ConfigManager, OrchestrationEngine, PluginHost, RunRequest, RunResult};

const DEFAULT_CONFIG_PATH: &str = "agency_config.json";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config_path = std::env::var("AGENCY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = ConfigManager::new(&config_path).load().await?;
    config.apply_env_overrides();

    let plugins = Arc::new(PluginHost::new());
    plugins.register_instance(CalculatorPlugin::new()).await;

    let mut engine = OrchestrationEngine::new().with_plugins(plugins.clone());
    match config.build_router() {
        Some(router) => engine = engine.with_router(Arc::new(router)),
        None => warn!("No 'default' provider configured; agents will return stub outputs"),
    }
    let engine = engine.with_config(config);

    let tenant = std::env::var("AGENCY_TENANT").unwrap_or_else(|_| "default".to_string());
    let context = std::env::var("AGENCY_DEPLOYMENT_CONTEXT")
        .ok()
        .and_then(|c| DeploymentContext::from_name(&c))
        .unwrap_or_default();
    info!(tenant = %tenant, context = %context, plugins = ?plugins.plugin_names().await, "Orchestrator ready");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        let request = RunRequest::new(args.join(" "), tenant).with_deployment_context(context);
        let result = engine.run(request).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Commands: 'quit' to exit\n");
    loop {
        print!("query> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let query = input.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        let request = RunRequest::new(query, tenant.clone()).with_deployment_context(context);
        let result = engine.run(request).await;
        print_result(&result);
    }

    Ok(())
}

fn print_result(result: &RunResult) {
    println!("\n{}", "-".repeat(50));
    println!("{}", result.answer);
    println!("{}", "-".repeat(50));
    println!(
        "confidence {:.2} | pattern {:?} | iterations {} | cost ${:.4} | trace {}",
        result.confidence, result.orchestration_pattern, result.iterations, result.cost_usd, result.trace_id
    );
    if !result.agents_used.is_empty() {
        println!("agents: {}", result.agents_used.join(", "));
    }
    for (i, citation) in result.citations.iter().enumerate() {
        println!("[{}] {}", i + 1, citation.source);
    }
    if let Some(ref verdict) = result.safety_verdict {
        println!("safety: {:?} ({} threats)", verdict.action, verdict.threats.len());
    }
    if result.hitl_required {
        println!(
            "review required: {}",
            result.hitl_reason.as_deref().unwrap_or("no reason given")
        );
    }
    println!();
}
