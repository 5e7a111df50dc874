#![deny(unused)]
//! Host-side storage for Vibebolt.
//!
//! - [`LocalWorkspace`]: the durable source tree the tools read and write.
//! - [`ArtifactCache`]: transient per-session files (stdin payloads) that are
//!   staged into a sandbox session alongside the workspace.

pub mod artifacts;
pub mod workspace;

pub use artifacts::ArtifactCache;
pub use workspace::LocalWorkspace;
