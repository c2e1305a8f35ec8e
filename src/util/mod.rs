//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod log;

pub use config::Config;
pub use diagnostic::Diagnostic;
pub use graph::DependencyGraph;
pub use log::{DecisionLog, Stage};
