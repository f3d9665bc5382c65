//! Crewline Engine Library
//!
//! Orchestration core of the crewline marketing crew. Used by the main
//! binary and the integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Telemetry and Observability
pub mod telemetry;

/// Durable collections (leads, content calendar)
pub mod store;

/// Tier router and usage ledger
pub mod router;

/// Reasoning engine abstraction
pub mod llm;

/// Capability registry
pub mod capability;

/// Built-in capabilities
pub mod tools;

/// Worker registry and default roster
pub mod workers;

/// Task graph executor and plan library
pub mod executor;

/// Process-wide context
pub mod context;

/// Pull and push ingestion
pub mod ingestion;

/// Request dispatch
pub mod dispatch;

/// Daily scheduled runs
pub mod scheduler;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
