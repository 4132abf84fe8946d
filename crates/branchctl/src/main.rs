mod workflow_runner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use branchline_apps::{create_default_registry, AppRegistry};
use branchline_engine::model::{parse_workflow, parse_workflow_json, Argument, Workflow};

use workflow_runner::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "branchctl")]
#[command(version, about = "Branchline workflow command line tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow definition on a local worker pool
    ///
    /// The execution starts at the workflow's start action unless --start
    /// names another one. --set overrides arguments of that first action.
    ///
    /// Examples:
    ///     branchctl run demos/approval.yaml --data '{"approved": true}'
    ///     branchctl run demos/approval.yaml --set data='{"amount": 50}'
    ///     branchctl run demos/approval.yaml --watch review -w 2
    #[command(verbatim_doc_comment)]
    Run {
        /// Workflow definition (YAML, or JSON with a .json extension)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Number of workers (default: BRANCHLINE_WORKERS or 4)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Action to start at
        #[arg(short, long)]
        start: Option<String>,

        /// Override an argument (format: name=value), can be repeated.
        /// Values are read as JSON, falling back to a plain string
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_argument)]
        arguments: Vec<Argument>,

        /// Data to deliver when the execution waits for input
        #[arg(long, value_name = "JSON", value_parser = parse_json)]
        data: Option<Value>,

        /// Log every event of this entity id, can be repeated
        #[arg(long, value_name = "ID")]
        watch: Vec<String>,

        /// Seconds to wait for the execution to finish
        #[arg(short, long, default_value_t = 60)]
        timeout: u64,
    },

    /// Parse a workflow definition and resolve it against the built-in apps
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List the registered apps
    Apps,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,branchline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            workers,
            start,
            arguments,
            data,
            watch,
            timeout,
        } => {
            let workflow = load_workflow(&file)?;
            workflow_runner::run(
                workflow,
                RunOptions {
                    workers,
                    start,
                    arguments,
                    data,
                    watch,
                    timeout: Duration::from_secs(timeout),
                },
            )
            .await
        }
        Commands::Validate { file } => {
            let mut workflow = load_workflow(&file)?;
            workflow
                .resolve(&create_default_registry())
                .with_context(|| format!("Workflow {} does not resolve", file.display()))?;
            println!(
                "{}: ok ({} actions, start: {})",
                workflow.name,
                workflow.actions.len(),
                workflow.start
            );
            Ok(())
        }
        Commands::Apps => {
            print!("{}", describe_apps(&create_default_registry()));
            Ok(())
        }
    }
}

/// Read a workflow definition, as JSON when the file says so and YAML
/// otherwise.
fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let workflow = if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow(&content)
    };
    workflow.with_context(|| format!("Failed to parse workflow file: {}", path.display()))
}

fn parse_argument(raw: &str) -> Result<Argument, String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid argument '{}', expected name=value", raw))?;
    if name.is_empty() {
        return Err(format!("invalid argument '{}', name is empty", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok(Argument::value(name, value))
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))
}

fn describe_apps(registry: &AppRegistry) -> String {
    let mut out = String::new();
    for name in registry.list() {
        let Some(app) = registry.app(name) else {
            continue;
        };
        out.push_str(&format!("{}\n", name));
        out.push_str(&format!("  actions:    {}\n", app.action_names().join(", ")));
        out.push_str(&format!("  conditions: {}\n", app.condition_names().join(", ")));
        out.push_str(&format!("  transforms: {}\n", app.transform_names().join(", ")));
    }
    out
}
