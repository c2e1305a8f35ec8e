//! Mooring - configuration resolution and build descriptors for OpenSSL-style
//! packages
//!
//! This crate resolves a target platform and option tokens into one
//! consistent configuration, plans the generated files it needs, and emits
//! a makefile plus configuration dumps for an external build tool.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod util;

pub use core::{Catalog, Configuration, ConfigureError, TargetPlatform};
pub use resolver::ResolvedFeatures;
pub use util::log::DecisionLog;
