pub mod agent;
pub mod cli;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod tools;

use agent::{ ReactAgent, ReactAgentConfig };
use cli::Args;
use history::initialize_history_store;
use llm::ProviderRegistry;
use log::{ info, warn };
use server::{ AppState, ChatSettings, Server };
use std::error::Error;
use std::sync::Arc;
use tools::{ SearchTool, ToolRegistry };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Rate Limit (req/s): {}", args.rate_limit_per_second);
    info!("History Store Type: {}", args.history_type);
    if args.history_type.eq_ignore_ascii_case("redis") {
        info!("History Store Host: {}", args.history_host);
    }
    info!("Default Model: {}", args.default_model);
    info!("Available Models: {}", args.available_models.join(", "));
    info!("Max Agent Steps: {}", args.max_steps);
    info!("Default Max Search Results: {}", args.default_max_search_results);
    info!("Stream Char Delay (ms): {}", args.stream_char_delay_ms);
    info!("Inline Tool Preview: {}", args.stream_inline_tools);
    info!("-------------------------");

    let history = initialize_history_store(&args)?;

    if args.tavily_api_key.trim().is_empty() {
        warn!("TAVILY_API_KEY is not set; the search tool will report errors to the model");
    }
    let tools = ToolRegistry::new().with(
        Arc::new(SearchTool::new(Some(args.tavily_api_key.clone()), args.tavily_base_url.clone()))
    );

    let models = ProviderRegistry::from_args(&args);
    let ready = models.configured_providers();
    if ready.is_empty() {
        warn!("No model provider is configured; chat requests will fail");
    } else {
        let names: Vec<&str> = ready.iter().map(|t| t.as_str()).collect();
        info!("Configured model providers: {}", names.join(", "));
    }

    let agent = ReactAgent::new(Arc::new(models), tools.clone(), ReactAgentConfig {
        system_prompt: args.system_prompt.clone(),
        max_steps: args.max_steps,
    });

    let state = AppState::new(Arc::new(agent), history, ChatSettings::from_args(&args))
        .with_tools(tools)
        .with_rate_limit(args.rate_limit_per_second);

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await?;

    Ok(())
}
