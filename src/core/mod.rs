//! Core data structures for Mooring.
//!
//! This module contains the foundational types the pipeline passes around:
//! - Target platforms and their toolchain defaults
//! - Features and the validated feature graph
//! - Provider modules and generated artifacts
//! - The catalog that declares all of the above
//! - The configuration state and its frozen form

pub mod artifact;
pub mod catalog;
pub mod errors;
pub mod feature;
pub mod module;
pub mod platform;
pub mod state;

pub use artifact::{ArtifactStage, GeneratedArtifact, Generator};
pub use catalog::Catalog;
pub use errors::ConfigureError;
pub use feature::{FeatureFlag, FeatureGraph, ToolchainHook};
pub use module::{InstallDir, ModuleKind, ProviderModule, ProviderModuleCatalog, ResolvedModule};
pub use platform::{OsFamily, PlatformResolver, TargetPlatform, ToolchainDefaults};
pub use state::{Configuration, ConfigurationState, InstallPaths, PackageInfo};
