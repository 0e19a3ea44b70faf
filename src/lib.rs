//! Engagement engine for the Nutrios nutrition coach: achievement badges and
//! personalized habit challenges derived from a client's meal history and
//! macro target corridors.
//!
//! The crate is pure computation over persisted records. Capture pipelines,
//! bot/HTTP surfaces and dashboards live elsewhere and reach the engine
//! through the services in [`services`].

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::EngineError;
