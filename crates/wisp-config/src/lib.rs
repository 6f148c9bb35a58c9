//! Wisp Config
//!
//! Serializable settings for the wisp graph engine. These are loaded by the
//! host (CLI, desktop shell) before a graph is constructed and never change
//! while a graph is running.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=engine.json`)
//! - Defaults, when no file is present
//!
//! ```json
//! { "update_rate_hz": 60, "event_buffer": 256, "log_filter": "wisp_graph=debug" }
//! ```

mod engine;

pub use engine::EngineConfig;
