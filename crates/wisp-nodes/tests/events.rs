//! Event triggers and flow control inside a running graph.

use std::sync::Arc;
use std::time::Duration;

use wisp_config::EngineConfig;
use wisp_graph::{Graph, GraphEvent, NodeId};
use wisp_nodes::*;
use wisp_schema::{DataType, Value};

fn create_test_graph() -> Graph {
  Graph::new(EngineConfig::without_updates())
}

fn add_log(graph: &Graph) -> (Arc<Log>, NodeId) {
  let log = Arc::new(Log::new());
  let id = graph.add_node_arc(log.clone()).unwrap();
  (log, id)
}

fn parameter(name: &str, value: impl Into<Value>) -> GraphEvent {
  GraphEvent::ParameterReceived {
    name: name.into(),
    value: value.into(),
  }
}

#[tokio::test]
async fn test_on_parameter_logs_matching_parameter() {
  let graph = create_test_graph();
  let trigger = graph.add_node(OnParameter::new("Gesture")).unwrap();
  let (log, log_id) = add_log(&graph);
  graph.connect_flow(trigger, 0, log_id).unwrap();
  graph.connect_value(trigger, 0, log_id, 0).unwrap();

  graph.start().await;
  graph.handle_event(parameter("Other", 1));
  graph.wait_idle().await;
  assert!(log.lines().is_empty());

  graph.handle_event(parameter("Gesture", 3));
  graph.wait_idle().await;
  assert_eq!(log.lines(), vec!["3"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_on_start_fires_once_per_start() {
  let graph = create_test_graph();
  let on_start = graph.add_node(OnStart).unwrap();
  let message = graph.add_node(Constant::text("hello")).unwrap();
  let (log, log_id) = add_log(&graph);
  graph.connect_flow(on_start, 0, log_id).unwrap();
  graph.connect_value(message, 0, log_id, 0).unwrap();

  graph.start().await;
  graph.wait_idle().await;
  graph.stop().await;
  graph.start().await;
  graph.wait_idle().await;

  assert_eq!(log.lines(), vec!["hello", "hello"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_parameter_source_dispatches_display() {
  let graph = create_test_graph();
  let source = graph
    .add_node(ParameterSource::new("Volume", DataType::Float))
    .unwrap();
  let display = Arc::new(Display::new());
  let display_id = graph.add_node_arc(display.clone()).unwrap();
  graph.connect_value(source, 0, display_id, 0).unwrap();

  graph.start().await;
  graph.handle_event(parameter("Volume", 2));
  graph.wait_idle().await;
  // Same value again: nothing changed, nothing dispatched.
  graph.handle_event(parameter("Volume", 2.0));
  graph.wait_idle().await;
  // Not convertible to float: ignored.
  graph.handle_event(parameter("Volume", "loud"));
  graph.wait_idle().await;

  assert_eq!(display.history(), vec![Value::Float(2.0)]);
  graph.stop().await;
}

#[tokio::test]
async fn test_for_loop_runs_scoped_body_then_completes() {
  let graph = create_test_graph();
  let on_start = graph.add_node(OnStart).unwrap();
  let start = graph.add_node(Constant::int(0)).unwrap();
  let end = graph.add_node(Constant::int(3)).unwrap();
  let for_loop = graph.add_node(ForLoop).unwrap();
  let (body, body_id) = add_log(&graph);
  let done_message = graph.add_node(Constant::text("done")).unwrap();
  let (done, done_id) = add_log(&graph);

  graph.connect_flow(on_start, 0, for_loop).unwrap();
  graph.connect_value(start, 0, for_loop, 0).unwrap();
  graph.connect_value(end, 0, for_loop, 1).unwrap();
  graph.connect_flow(for_loop, 0, body_id).unwrap();
  graph.connect_value(for_loop, 0, body_id, 0).unwrap();
  graph.connect_flow(for_loop, 1, done_id).unwrap();
  graph.connect_value(done_message, 0, done_id, 0).unwrap();

  graph.start().await;
  graph.wait_idle().await;

  assert_eq!(body.lines(), vec!["0", "1", "2"]);
  assert_eq!(done.lines(), vec!["done"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_branch_follows_condition() {
  let graph = create_test_graph();
  let trigger = graph.add_node(OnParameter::new("Go")).unwrap();
  let branch = graph.add_node(Branch).unwrap();
  let condition = graph
    .add_node(ParameterSource::new("Enabled", DataType::Bool))
    .unwrap();
  let yes_message = graph.add_node(Constant::text("yes")).unwrap();
  let no_message = graph.add_node(Constant::text("no")).unwrap();
  let (yes, yes_id) = add_log(&graph);
  let (no, no_id) = add_log(&graph);

  graph.connect_flow(trigger, 0, branch).unwrap();
  graph.connect_value(condition, 0, branch, 0).unwrap();
  graph.connect_flow(branch, 0, yes_id).unwrap();
  graph.connect_flow(branch, 1, no_id).unwrap();
  graph.connect_value(yes_message, 0, yes_id, 0).unwrap();
  graph.connect_value(no_message, 0, no_id, 0).unwrap();

  graph.start().await;
  graph.handle_event(parameter("Go", true));
  graph.wait_idle().await;
  graph.handle_event(parameter("Enabled", true));
  graph.wait_idle().await;
  graph.handle_event(parameter("Go", true));
  graph.wait_idle().await;

  assert_eq!(no.lines(), vec!["no"]);
  assert_eq!(yes.lines(), vec!["yes"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_sequence_fires_outputs_in_order() {
  let graph = create_test_graph();
  let on_start = graph.add_node(OnStart).unwrap();
  let sequence = graph.add_node(Sequence::new(2)).unwrap();
  let (log, log_id) = add_log(&graph);
  let first = graph.add_node(Constant::text("first")).unwrap();
  let (second_log, second_id) = add_log(&graph);
  let second = graph.add_node(Constant::text("second")).unwrap();

  graph.connect_flow(on_start, 0, sequence).unwrap();
  graph.connect_flow(sequence, 0, log_id).unwrap();
  graph.connect_flow(sequence, 1, second_id).unwrap();
  graph.connect_value(first, 0, log_id, 0).unwrap();
  graph.connect_value(second, 0, second_id, 0).unwrap();

  graph.start().await;
  graph.wait_idle().await;

  assert_eq!(log.lines(), vec!["first"]);
  assert_eq!(second_log.lines(), vec!["second"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_on_changed_compares_with_previous_value() {
  let graph = create_test_graph();
  let constant = Arc::new(Constant::float(1.0));
  let constant_id = graph.add_node_arc(constant.clone()).unwrap();
  let on_changed = graph.add_node(OnChanged).unwrap();
  let (log, log_id) = add_log(&graph);
  graph.connect_value(constant_id, 0, on_changed, 0).unwrap();
  graph.connect_flow(on_changed, 0, log_id).unwrap();
  graph.connect_value(on_changed, 0, log_id, 0).unwrap();

  graph.start().await;
  graph.dispatch(constant_id);
  graph.wait_idle().await;
  graph.dispatch(constant_id);
  graph.wait_idle().await;
  constant.set(2.0);
  graph.dispatch(constant_id);
  graph.wait_idle().await;

  assert_eq!(log.lines(), vec!["null", "1"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_on_speech_ignores_partials_by_default() {
  let graph = create_test_graph();
  let speech = graph.add_node(OnSpeech::new(false)).unwrap();
  let (log, log_id) = add_log(&graph);
  graph.connect_flow(speech, 0, log_id).unwrap();
  graph.connect_value(speech, 0, log_id, 0).unwrap();

  graph.start().await;
  graph.handle_event(GraphEvent::SpeechPartial { text: "hel".into() });
  graph.wait_idle().await;
  graph.handle_event(GraphEvent::SpeechFinal {
    text: "hello".into(),
  });
  graph.wait_idle().await;

  assert_eq!(log.lines(), vec!["hello"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_instance_events_route_by_kind() {
  let graph = create_test_graph();
  let instance = graph.add_node(OnInstanceEvent).unwrap();
  let (joined, joined_id) = add_log(&graph);
  let (left, left_id) = add_log(&graph);
  graph.connect_flow(instance, 0, joined_id).unwrap();
  graph.connect_flow(instance, 1, left_id).unwrap();
  graph.connect_value(instance, 0, joined_id, 0).unwrap();
  graph.connect_value(instance, 0, left_id, 0).unwrap();

  graph.start().await;
  graph.handle_event(GraphEvent::InstanceJoined { user: "ana".into() });
  graph.wait_idle().await;
  graph.handle_event(GraphEvent::InstanceLeft { user: "bo".into() });
  graph.wait_idle().await;

  assert_eq!(joined.lines(), vec!["ana"]);
  assert_eq!(left.lines(), vec!["bo"]);
  graph.stop().await;
}

#[tokio::test]
async fn test_avatar_change_and_set_variable() {
  let graph = create_test_graph();
  graph.create_variable("avatar", DataType::Text, true).unwrap();
  let avatar = graph.add_node(OnAvatarChanged).unwrap();
  let set = graph.add_node(SetVariable::new("avatar")).unwrap();
  graph.connect_flow(avatar, 0, set).unwrap();
  graph.connect_value(avatar, 0, set, 0).unwrap();

  graph.start().await;
  graph.handle_event(GraphEvent::AvatarChanged {
    avatar_id: "avtr_1".into(),
  });
  graph.wait_idle().await;
  graph.stop().await;

  // Persistent variables survive stop.
  assert_eq!(graph.variable("avatar"), Some(Value::Text("avtr_1".into())));
}

#[tokio::test]
async fn test_stop_cuts_delay_short() {
  let graph = create_test_graph();
  let on_start = graph.add_node(OnStart).unwrap();
  let delay = graph.add_node(Delay).unwrap();
  let seconds = graph.add_node(Constant::float(10.0)).unwrap();
  let (log, log_id) = add_log(&graph);
  graph.connect_flow(on_start, 0, delay).unwrap();
  graph.connect_value(seconds, 0, delay, 0).unwrap();
  graph.connect_flow(delay, 0, log_id).unwrap();

  graph.start().await;
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert_eq!(graph.active_pass_count(), 1);
  graph.stop().await;

  assert!(log.lines().is_empty());
  assert_eq!(graph.active_pass_count(), 0);
}
