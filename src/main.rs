use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use codecanvas::config::{Cli, Config};
use codecanvas::repl::Repl;
use codecanvas::telemetry::init_tracing;
use codecanvas::{
    AgentController, CodeExecutor, GeminiClient, Sandbox, Session, TavilyClient, ToolRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_format = cli.log_format;
    init_tracing(log_format).map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::validate(cli)?;

    let sandbox = Sandbox::open(&config.workspace)
        .with_context(|| format!("failed to open workspace {}", config.workspace.display()))?;

    let gateway = GeminiClient::new(&config.model_api_key, &config.model, config.http_timeout)
        .context("failed to create Gemini client")?;
    let search = TavilyClient::new(&config.search_api_key, config.http_timeout)
        .context("failed to create search client")?;
    let executor = Arc::new(CodeExecutor::new(config.exec_timeout));

    let registry = ToolRegistry::standard(executor.clone(), Arc::new(search), config.search_results);
    let controller = AgentController::new(Arc::new(gateway), registry, config.agent_config());

    let session = Session::new(sandbox);
    info!(
        session_id = %session.id,
        model = %config.model,
        workspace = %session.sandbox().root().display(),
        "Session started"
    );

    Repl::new(controller, executor, session).run().await?;
    Ok(())
}
