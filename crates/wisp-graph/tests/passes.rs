//! Pass supersession, failure isolation and run lifecycle.

mod common;

use std::time::Duration;

use common::*;
use wisp_graph::GraphEvent;
use wisp_schema::{DataType, Value};

#[tokio::test]
async fn test_new_pass_cancels_and_awaits_previous() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let slow = graph
    .add_node(Slow {
      log: log.clone(),
      duration: Duration::from_millis(50),
      multi_flow: false,
    })
    .unwrap();

  graph.start().await;
  graph.start_flow(slow, None);
  tokio::time::sleep(Duration::from_millis(10)).await;
  assert_eq!(graph.active_pass_count(), 1);

  graph.start_flow(slow, None);
  graph.wait_idle().await;

  assert_eq!(log.entries(), vec!["start", "cancelled", "start", "end"]);
  assert_eq!(graph.active_pass_count(), 0);
  graph.stop().await;
}

#[tokio::test]
async fn test_multi_flow_passes_overlap() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let slow = graph
    .add_node(Slow {
      log: log.clone(),
      duration: Duration::from_millis(20),
      multi_flow: true,
    })
    .unwrap();

  graph.start().await;
  graph.start_flow(slow, None);
  graph.start_flow(slow, None);
  graph.wait_idle().await;

  let entries = log.entries();
  assert_eq!(entries.iter().filter(|e| *e == "end").count(), 2);
  assert!(!entries.contains(&"cancelled".to_string()));
  graph.stop().await;
}

#[tokio::test]
async fn test_failing_pass_does_not_affect_siblings() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let failing = graph.add_node(Failing).unwrap();
  let ok = graph.add_node(FlowTrigger::new("ok", &log)).unwrap();

  graph.start().await;
  graph.start_flow(failing, None);
  graph.start_flow(ok, None);
  graph.wait_idle().await;

  assert_eq!(log.entries(), vec!["ok"]);
  assert_eq!(graph.active_pass_count(), 0);
  graph.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_running_passes() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let slow = graph
    .add_node(Slow {
      log: log.clone(),
      duration: Duration::from_secs(10),
      multi_flow: false,
    })
    .unwrap();

  graph.start().await;
  graph.start_flow(slow, None);
  tokio::time::sleep(Duration::from_millis(10)).await;
  graph.stop().await;

  assert_eq!(log.entries(), vec!["start", "cancelled"]);
  assert!(!graph.is_running());
  assert_eq!(graph.active_pass_count(), 0);
}

#[tokio::test]
async fn test_stop_clears_store_and_runs_stop_handlers() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let marker = graph.add_node(Marker).unwrap();
  graph
    .add_node(StopWatcher { log: log.clone() })
    .unwrap();

  graph.start().await;
  graph.start_flow(marker, None);
  graph.wait_idle().await;
  assert_eq!(graph.stored(marker, "marked"), Some(Value::Bool(true)));

  graph.stop().await;
  assert_eq!(graph.stored(marker, "marked"), None);
  // The handler ran, but its pass was never started.
  assert_eq!(log.entries(), vec!["stopped"]);
}

#[tokio::test]
async fn test_events_ignored_until_started() {
  let graph = create_test_graph();
  let log = Recorder::default();
  graph.add_node(FlowTrigger::new("P", &log)).unwrap();

  let event = GraphEvent::ParameterReceived {
    name: "x".into(),
    value: Value::Bool(true),
  };
  graph.handle_event(event.clone());
  graph.wait_idle().await;
  assert!(log.entries().is_empty());

  graph.start().await;
  graph.handle_event(event);
  graph.wait_idle().await;
  assert_eq!(log.entries(), vec!["P"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let trigger = graph.add_node(FlowTrigger::new("T", &log)).unwrap();

  graph.start().await;
  graph.stop().await;
  graph.start().await;
  graph.start_flow(trigger, None);
  graph.wait_idle().await;

  assert_eq!(log.entries(), vec!["T"]);
  graph.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rewiring_input_awaits_running_pass() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let first = graph.add_node_arc(Source::new(DataType::Float, 1.0)).unwrap();
  let second = graph.add_node_arc(Source::new(DataType::Float, 2.0)).unwrap();
  let sink = graph
    .add_node(Blocking {
      log: log.clone(),
      duration: Duration::from_millis(100),
    })
    .unwrap();
  graph.connect_value(first, 0, sink, 0).unwrap();

  graph.start().await;
  graph.dispatch(first);
  tokio::time::sleep(Duration::from_millis(30)).await;
  assert_eq!(log.entries(), vec!["start"]);

  graph.connect_value(second, 0, sink, 0).unwrap();
  graph.wait_idle().await;

  assert_eq!(log.entries(), vec!["start", "end", "start", "end"]);
  assert_eq!(graph.active_pass_count(), 0);
  graph.stop().await;
}

#[tokio::test]
async fn test_delete_cancels_pass_executing_node() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let trigger = graph.add_node(FlowTrigger::new("T", &log)).unwrap();
  let step = graph
    .add_node(SlowStep::new("late", &log, Duration::from_millis(200)))
    .unwrap();
  graph.connect_flow(trigger, 0, step).unwrap();

  graph.start().await;
  graph.start_flow(trigger, None);
  tokio::time::sleep(Duration::from_millis(30)).await;
  graph.delete_node(step).await.unwrap();
  assert_eq!(graph.active_pass_count(), 0);

  graph.wait_idle().await;
  assert_eq!(log.entries(), vec!["T"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_replacing_flow_edge_cancels_pass_inside_source() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let trigger = graph.add_node(FlowTrigger::new("T", &log)).unwrap();
  let slow = graph
    .add_node(SlowStep::new("slow", &log, Duration::from_millis(100)))
    .unwrap();
  let a = graph.add_node(Step::new("A", &log)).unwrap();
  let b = graph.add_node(Step::new("B", &log)).unwrap();
  graph.connect_flow(trigger, 0, slow).unwrap();
  graph.connect_flow(slow, 0, a).unwrap();

  graph.start().await;
  graph.start_flow(trigger, None);
  tokio::time::sleep(Duration::from_millis(20)).await;
  graph.connect_flow(slow, 0, b).unwrap();
  graph.wait_idle().await;

  assert_eq!(log.entries(), vec!["T"]);

  graph.start_flow(trigger, None);
  graph.wait_idle().await;
  assert_eq!(log.entries(), vec!["T", "T", "slow", "B"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_concurrent_wait_idle_callers_all_return() {
  let graph = create_test_graph();
  let log = Recorder::default();
  let slow = graph
    .add_node(Slow {
      log: log.clone(),
      duration: Duration::from_millis(30),
      multi_flow: false,
    })
    .unwrap();

  graph.start().await;
  graph.start_flow(slow, None);

  let other = graph.clone();
  let waiter = tokio::spawn(async move { other.wait_idle().await });
  graph.wait_idle().await;
  let joined = tokio::time::timeout(Duration::from_secs(2), waiter).await;
  assert!(joined.is_ok());

  assert_eq!(log.entries(), vec!["start", "end"]);
  graph.stop().await;
}
