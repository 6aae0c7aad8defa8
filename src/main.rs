// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use switchyard::config::EngineConfig;
use switchyard::executor::{ExecutorRegistry, HttpNodeExecutor, NodeExecutor, TemplateExecutor};
use switchyard::store::{GraphStore, SqliteGraphStore};
use switchyard::workflow::graph::{GraphAssembler, NodeKind};
use switchyard::workflow::{LifecycleManager, WorkflowLoader, WorkflowService};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite connection string (overrides SWITCHYARD_DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Iteration budget per run (overrides SWITCHYARD_MAX_ITERATIONS)
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Remote node executor endpoint (overrides SWITCHYARD_EXECUTOR_URL)
    #[arg(long, global = true)]
    executor_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a workflow definition file for an agent
    Import {
        #[arg(short, long)]
        agent: String,

        /// YAML or JSON definition
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Execute a stored workflow against one input message
    Run {
        #[arg(short, long)]
        workflow: String,

        #[arg(short, long)]
        input: String,

        /// Initial state as a JSON object
        #[arg(short, long)]
        context: Option<String>,

        /// Fail when the iteration budget is exhausted
        #[arg(long)]
        strict: bool,

        /// Print the full execution report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List an agent's workflows, newest first
    List {
        #[arg(short, long)]
        agent: String,
    },
    /// Print a workflow's assembled graph
    Show {
        #[arg(short, long)]
        workflow: String,
    },
    /// Print the assembled graph of an agent's newest workflow
    Latest {
        #[arg(short, long)]
        agent: String,
    },
    /// Delete a workflow
    Delete {
        #[arg(short, long)]
        workflow: String,
    },
}

async fn build_executor(config: &EngineConfig) -> Arc<dyn NodeExecutor> {
    let registry = ExecutorRegistry::new().with_fallback(Arc::new(TemplateExecutor::new()));

    if let Some(url) = &config.executor_url {
        let remote: Arc<dyn NodeExecutor> = Arc::new(HttpNodeExecutor::new(url.clone()));
        for kind in [NodeKind::Prompt, NodeKind::Tool] {
            log::info!("Routing {} nodes to {}", kind, url);
            registry.register(kind, remote.clone()).await;
        }
    }

    Arc::new(registry)
}

fn parse_context(raw: Option<&str>) -> anyhow::Result<Option<Map<String, Value>>> {
    raw.map(|text| serde_json::from_str(text).context("--context must be a JSON object"))
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if let Some(url) = args.executor_url {
        config.executor_url = Some(url);
    }
    config.validate()?;

    let store: Arc<dyn GraphStore> = Arc::new(
        SqliteGraphStore::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open {}", config.database_url))?,
    );
    let lifecycle = LifecycleManager::new(store.clone());

    match args.command {
        Commands::Import { agent, file } => {
            let definition = WorkflowLoader::new().load_definition(&file)?;
            let row = lifecycle.create(&agent, &definition).await?;
            println!("Imported workflow {} ({})", row.id, row.name);
        }
        Commands::Run {
            workflow,
            input,
            context,
            strict,
            json,
        } => {
            let context = parse_context(context.as_deref())?;
            let executor = build_executor(&config).await;
            let service = WorkflowService::new(store, executor, &config);

            let report = service.execute_workflow(&workflow, &input, context).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Response: {}", report.response);
                println!(
                    "Visited {} nodes in {:.3}s",
                    report.iterations, report.execution_time_seconds
                );
            }

            if strict && !report.completed {
                bail!(
                    "Workflow {} did not finish within {} iterations",
                    workflow,
                    config.max_iterations
                );
            }
        }
        Commands::List { agent } => {
            for row in lifecycle.list_for_agent(&agent).await? {
                println!(
                    "{}  {}  {}",
                    row.id,
                    row.created_at.format("%Y-%m-%d %H:%M:%S"),
                    row.name
                );
            }
        }
        Commands::Show { workflow } => {
            let graph = GraphAssembler::new(store).assemble(&workflow).await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Latest { agent } => match lifecycle.latest_for_agent(&agent).await? {
            Some(graph) => println!("{}", serde_json::to_string_pretty(&graph)?),
            None => println!("No workflows for agent {}", agent),
        },
        Commands::Delete { workflow } => {
            lifecycle.delete(&workflow).await?;
            println!("Deleted workflow {}", workflow);
        }
    }

    Ok(())
}
