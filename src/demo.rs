//! Demo graphs the CLI can run.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde_json::json;
use wisp_config::EngineConfig;
use wisp_graph::{ConnectOutcome, Graph, NodeId};
use wisp_nodes::{Add, Display, Log, OnParameter, ParameterSource};
use wisp_schema::DataType;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DemoKind {
  /// `Gesture` parameters are logged as they arrive
  ParameterLog,
  /// Parameters `A` and `B` are added and displayed
  Sum,
}

enum Probe {
  Log(Arc<Log>),
  Display(Arc<Display>),
}

/// A demo graph and the node whose output is reported.
pub struct Demo {
  pub graph: Graph,
  probe: Probe,
}

impl Demo {
  pub fn build(kind: DemoKind, config: EngineConfig) -> Result<Self> {
    let graph = Graph::new(config);
    let probe = match kind {
      DemoKind::ParameterLog => {
        let trigger = graph.add_node(OnParameter::new("Gesture"))?;
        let log = Arc::new(Log::new());
        let log_id = graph.add_node_arc(log.clone())?;
        graph.connect_flow(trigger, 0, log_id)?;
        connect(&graph, trigger, log_id, 0)?;
        Probe::Log(log)
      }
      DemoKind::Sum => {
        let a = graph.add_node(ParameterSource::new("A", DataType::Float))?;
        let b = graph.add_node(ParameterSource::new("B", DataType::Float))?;
        let add = graph.add_node(Add)?;
        let display = Arc::new(Display::new());
        let display_id = graph.add_node_arc(display.clone())?;
        connect(&graph, a, add, 0)?;
        connect(&graph, b, add, 1)?;
        connect(&graph, add, display_id, 0)?;
        Probe::Display(display)
      }
    };
    Ok(Self { graph, probe })
  }

  /// What the probe node observed, as JSON.
  pub fn results(&self) -> Result<serde_json::Value> {
    let value = match &self.probe {
      Probe::Log(log) => json!({ "lines": log.lines() }),
      Probe::Display(display) => json!({
        "history": serde_json::to_value(display.history()).context("failed to encode display history")?,
      }),
    };
    Ok(value)
  }
}

fn connect(graph: &Graph, source: NodeId, destination: NodeId, slot: usize) -> Result<()> {
  match graph.connect_value(source, 0, destination, slot)? {
    ConnectOutcome::Rejected => bail!("demo connection {} -> {} rejected", source, destination),
    _ => Ok(()),
  }
}
