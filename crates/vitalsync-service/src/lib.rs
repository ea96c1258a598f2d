//! Offline-first telemetry synchronization engine.
//!
//! Readings are persisted locally as `dirty` records, delivered in order by a
//! single-flight flush worker, and merged with remote history for display.
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with validation
//! - [`context`]: state shared by the worker and the reconciler
//! - [`flush`]: FIFO-with-halt delivery of queued records
//! - [`reconcile`]: remote/local series merge with fuzzy deduplication
//! - [`engine`]: the facade tying them together

pub mod config;
pub mod context;
pub mod engine;
pub mod flush;
pub mod reconcile;

pub use config::{Config, ConfigError, ValidationError, default_config_path};
pub use context::EngineContext;
pub use engine::{Engine, EngineError, EngineStatus};
pub use flush::{FlushOutcome, FlushStats, FlushWorker};
pub use reconcile::{Reconciler, merge};
