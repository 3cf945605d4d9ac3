//! ROTOR — Rotation-Ordered Trading Orchestration Runtime
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod stores;
pub mod providers;
pub mod notify;
pub mod coordinator;
pub mod dashboard;
