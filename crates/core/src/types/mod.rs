//! Core type definitions for Vibebolt.

pub mod tool;

pub use tool::*;
