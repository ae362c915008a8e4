//! Command-line front end for a capability-gated dispatcher.
//!
//! Search and web targets are offline stand-ins; code and file tools run for
//! real.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use toolgate::config::RuntimeSettings;
use toolgate::primitives::ToolArguments;
use toolgate::telemetry::init_tracing;
use toolgate::{Dispatcher, RuntimeBuilder};
use tracing::info;

/// Dispatch tool calls on behalf of configured agents
#[derive(Parser)]
#[command(name = "dispatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Definition files (tools, capabilities, agents)
    #[arg(short, long = "config", global = true, default_values = ["config/tools.yaml", "config/capabilities.yaml"])]
    configs: Vec<PathBuf>,

    /// Runtime settings file
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a tool as an agent
    Call {
        /// Requesting agent
        #[arg(short, long)]
        agent: Option<String>,

        /// Tool to invoke
        tool: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },

    /// List registered tools, or the tools one agent may call
    Tools {
        /// Restrict the listing to this agent
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Print the capability catalogue
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = RuntimeSettings::load(cli.settings.as_deref())?;
    init_tracing(&settings.telemetry)?;

    let dispatcher = RuntimeBuilder::from_yaml_files(&cli.configs)?
        .settings(settings)
        .target("tools.search_functions.ddg_search", offline_search)
        .target("tools.web_functions.get_web_page", offline_fetch)
        .build()?;
    info!(tools = dispatcher.tools().names().len(), "dispatcher ready");

    match cli.command {
        Commands::Call { agent, tool, args } => call(&dispatcher, agent, &tool, &args).await,
        Commands::Tools { agent } => list_tools(&dispatcher, agent.as_deref()),
        Commands::Capabilities => {
            print!("{}", dispatcher.matcher().describe_capabilities());
            Ok(())
        }
    }
}

async fn call(dispatcher: &Dispatcher, agent: Option<String>, tool: &str, raw: &str) -> Result<()> {
    let args = match serde_json::from_str(raw).context("arguments must be JSON")? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => bail!("arguments must be a JSON object, got {other}"),
    };

    let agent = match agent {
        Some(agent) => agent,
        None => dispatcher
            .select_agent(tool)
            .map(|agent| agent.name().to_owned())
            .with_context(|| format!("no agent is authorized for `{tool}`"))?,
    };

    match dispatcher.dispatch_structured(&agent, tool, &args).await {
        Ok(output) => println!("{output}"),
        Err(failure) => println!("{}", serde_json::to_string_pretty(&failure)?),
    }
    Ok(())
}

fn list_tools(dispatcher: &Dispatcher, agent: Option<&str>) -> Result<()> {
    let names: Vec<&str> = match agent {
        Some(agent) => dispatcher
            .authorized_tools(agent)?
            .iter()
            .map(String::as_str)
            .collect(),
        None => dispatcher.tools().names(),
    };

    for name in names {
        let Some(definition) = dispatcher.tools().definition(name) else {
            continue;
        };
        println!(
            "{name} [{}] {}",
            definition.function_type(),
            definition.description()
        );
    }
    Ok(())
}

async fn offline_search(args: ToolArguments) -> Result<String> {
    let topic = args.get_str("topic").unwrap_or_default();
    let limit = args.get_i64("max_results").unwrap_or(5);
    Ok(format!(
        "search backend offline; would return up to {limit} results for \"{topic}\""
    ))
}

async fn offline_fetch(args: ToolArguments) -> Result<String> {
    let url = args.get_str("url").unwrap_or_default();
    Ok(format!("web backend offline; would fetch {url}"))
}
