//! High-level operations.
//!
//! This module contains the implementation of Mooring commands.

pub mod configure;
pub mod matrix;

pub use configure::{
    configure, plan_configuration, resolve_configuration, ConfigureOptions, ConfigureResult,
};
pub use matrix::{all_targets, load_matrix, run_matrix, MatrixEntry, MatrixOptions, MatrixOutcome};
