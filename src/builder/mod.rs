//! Everything after feature resolution: artifact planning, command
//! rendering, descriptor emission and parity checks.

pub mod descriptor;
pub mod dump;
pub mod parity;
pub mod planner;
pub mod toolchain;

pub use descriptor::{BuildDescriptor, BuildDescriptorEmitter, Rule};
pub use dump::ConfigDump;
pub use parity::{IncompleteGenerationWarning, ParityReference, ParityReport, ParityValidator};
pub use planner::{ArtifactPlan, GeneratedArtifactPlanner};
pub use toolchain::{toolchain_for, CommandSpec, GnuToolchain, MsvcToolchain, Toolchain};
