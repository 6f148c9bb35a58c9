use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default tick rate of the update loop.
pub const DEFAULT_UPDATE_RATE_HZ: u32 = 100;

/// Default capacity of the external event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Ticks per second of the update loop. `0` disables the loop entirely.
  pub update_rate_hz: u32,

  /// Capacity of the channel feeding external events into a running graph.
  pub event_buffer: usize,

  /// Default tracing filter directive, e.g. `"info"` or `"wisp_graph=debug"`.
  /// `RUST_LOG` takes precedence when set.
  pub log_filter: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      update_rate_hz: DEFAULT_UPDATE_RATE_HZ,
      event_buffer: DEFAULT_EVENT_BUFFER,
      log_filter: "info".to_string(),
    }
  }
}

impl EngineConfig {
  /// Parse a configuration from JSON. Missing fields take their defaults.
  pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
    serde_json::from_str(json)
  }

  /// Interval between update ticks, or `None` when the loop is disabled.
  pub fn update_interval(&self) -> Option<Duration> {
    if self.update_rate_hz == 0 {
      return None;
    }
    Some(Duration::from_nanos(
      1_000_000_000 / u64::from(self.update_rate_hz),
    ))
  }

  /// A configuration with the update loop disabled.
  ///
  /// Useful for tests and hosts that drive updates themselves.
  pub fn without_updates() -> Self {
    Self {
      update_rate_hz: 0,
      ..Self::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.update_rate_hz, 100);
    assert_eq!(config.event_buffer, 100);
    assert_eq!(config.update_interval(), Some(Duration::from_millis(10)));
  }

  #[test]
  fn test_partial_json_uses_defaults() {
    let config = EngineConfig::from_json_str(r#"{ "update_rate_hz": 50 }"#).unwrap();
    assert_eq!(config.update_rate_hz, 50);
    assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
    assert_eq!(config.log_filter, "info");
    assert_eq!(config.update_interval(), Some(Duration::from_millis(20)));
  }

  #[test]
  fn test_zero_rate_disables_updates() {
    let config = EngineConfig::without_updates();
    assert_eq!(config.update_interval(), None);
  }

  #[test]
  fn test_invalid_json() {
    assert!(EngineConfig::from_json_str(r#"{ "update_rate_hz": "fast" }"#).is_err());
  }
}
