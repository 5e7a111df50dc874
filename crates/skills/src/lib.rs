#![deny(unused)]
//! Tool registry for Vibebolt.
//!
//! Tools are registered once at startup and looked up by name for every
//! incoming tool call.

pub mod registry;

pub use registry::DefaultToolRegistry;
