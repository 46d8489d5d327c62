// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use maestro_config::Config;
use maestro_model::{ChatModel, OpenAiChatModel};
use maestro_tools::builtin::{CodeInterpreterTool, DeepSearchTool, FileTool, ReportTool};
use maestro_tools::{discover_mcp_tools, ToolCollection};

#[derive(Parser)]
#[command(name = "maestro", about = "Multi-agent orchestration service")]
struct Cli {
    /// Explicit config file (merged over the discovered layers)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address for the HTTP ingress
    #[arg(long, default_value = "127.0.0.1:8088")]
    listen: String,
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(maestro_config::load(cli.config.as_deref())?);

    // One pooled client shared by the model client and every tool backend.
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.sse.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.sse.read_timeout_secs))
        .build()
        .context("building http client")?;

    let profile = config
        .llm
        .profile(None)
        .context("no llm profile configured")?
        .clone();
    let model_name = profile.model.clone();
    let llm: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(profile, http.clone()));

    let tools = Arc::new(build_base_collection(&config, &http).await);

    tracing::info!(
        listen = %cli.listen,
        model = %model_name,
        tools = ?tools.names(),
        "maestro starting"
    );

    let state = server::AppState {
        config,
        llm,
        tools,
        http,
    };
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    axum::serve(listener, server::router(state))
        .await
        .context("http server failed")?;
    Ok(())
}

/// The boot-time tool prototype: built-ins plus everything the configured
/// MCP servers expose.  Each request takes a `request_view` of this.
async fn build_base_collection(config: &Config, http: &reqwest::Client) -> ToolCollection {
    let tools = ToolCollection::new();
    tools.register(Arc::new(CodeInterpreterTool));
    tools.register(Arc::new(DeepSearchTool));
    tools.register(Arc::new(FileTool));
    tools.register(Arc::new(ReportTool));
    tools.set_persona(CodeInterpreterTool::NAME, "Coder");
    tools.set_persona(DeepSearchTool::NAME, "Researcher");
    tools.set_persona(ReportTool::NAME, "Editor");

    for tool in discover_mcp_tools(http, &config.mcp.servers).await {
        tools.register(tool);
    }
    tools
}

fn init_logging(verbose: bool) {
    let default = if verbose { "maestro=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
