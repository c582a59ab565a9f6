//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate intake, fold and propagation into the engine's message
//!   entry point.
//! - Keep transport and host layers decoupled from storage details.

pub mod aggregate_service;
