#![deny(unused)]
//! Core types, traits, and error definitions for Vibebolt.
//!
//! This crate provides the foundational building blocks shared by the
//! workspace store, the sandbox pipeline, the tool registry and the gateway.

pub mod config;
pub mod error;
pub mod fs_policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use fs_policy::WorkspaceRoot;
pub use traits::*;
pub use types::*;
