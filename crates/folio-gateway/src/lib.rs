//! `folio-gateway`: admin HTTP API over the scheduler and webhook dispatcher.
//!
//! The binary in `main.rs` wires the subsystems together; this library half
//! exposes the router and the gateway-provided task executors so they can be
//! exercised in-process.

pub mod app;
pub mod auth;
pub mod custom;
pub mod error;
pub mod http;
pub mod maintenance;
pub mod task_events;
