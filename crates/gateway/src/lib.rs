#![deny(unused)]
//! HTTP tool-call gateway for Vibebolt.
//!
//! Exposes the registered tools to a remote tool-calling client:
//! `GET /v1/tools` lists definitions and `POST /v1/tools/:name` executes one.

pub mod server;

pub use server::{GatewayConfig, GatewayServer};
