//! Core traits for Vibebolt.
//!
//! Traits are organized by the boundary they describe:
//! - `skills`: tool-call boundary (Tool, ToolRegistry)
//! - `store`: workspace boundary (WorkspaceStore)

pub mod skills;
pub mod store;

pub use skills::*;
pub use store::*;
