mod demo;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wisp_config::EngineConfig;
use wisp_graph::{EventRunner, GraphEvent};
use wisp_schema::SchemaCache;

use crate::demo::{Demo, DemoKind};

/// Wisp - a reactive node graph runtime
#[derive(Parser)]
#[command(name = "wisp")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the engine config (default: ~/.wisp/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a demo graph, feeding it JSON-line events from stdin
  Run {
    #[arg(long, value_enum)]
    demo: DemoKind,
  },

  /// Print the schemas of the built-in nodes
  Nodes,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = load_config(cli.config.as_deref())?;

  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Some(Commands::Run { demo }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_demo(demo, config))?;
    }
    Some(Commands::Nodes) => print_nodes()?,
    None => {
      println!("wisp - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => {
      let Some(default) = dirs::home_dir().map(|home| home.join(".wisp").join("config.json")) else {
        return Ok(EngineConfig::default());
      };
      if !default.exists() {
        return Ok(EngineConfig::default());
      }
      default
    }
  };

  let content = std::fs::read_to_string(&path)
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  EngineConfig::from_json_str(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

async fn run_demo(kind: DemoKind, config: EngineConfig) -> Result<()> {
  let demo = Demo::build(kind, config).context("failed to build demo graph")?;
  let graph = demo.graph.clone();
  eprintln!("Loaded demo {:?} with {} nodes", kind, graph.node_count());

  graph.start().await;

  let runner = EventRunner::new(graph.clone());
  let sender = runner.sender();
  let cancel = CancellationToken::new();
  let runner_task = tokio::spawn(runner.start(cancel.clone()));

  // Events arrive one JSON object per line; EOF ends the run.
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut received = 0usize;
  while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let event: GraphEvent =
      serde_json::from_str(line).with_context(|| format!("invalid event: {}", line))?;
    sender
      .send(event)
      .await
      .context("event runner stopped early")?;
    received += 1;
  }
  drop(sender);

  runner_task
    .await
    .context("event runner panicked")?
    .context("event runner failed")?;
  graph.wait_idle().await;

  let results = demo.results()?;
  graph.stop().await;

  eprintln!("Events delivered: {}", received);
  println!("{}", serde_json::to_string_pretty(&results)?);
  Ok(())
}

fn print_nodes() -> Result<()> {
  let schemas = SchemaCache::new();
  let mut output = Vec::new();
  for node in wisp_nodes::catalog() {
    let schema = schemas
      .get_or_build(&node.type_name(), || node.declare())
      .with_context(|| format!("invalid built-in node: {}", node.type_name()))?;
    output.push(serde_json::to_value(&*schema)?);
  }
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}
