//! Service d'exécution et sa configuration.

mod config;
mod service;

pub use config::{EngineConfig, ExecMode};
pub use service::{EngineStats, ExecPath, Execution, ExecutionService};
