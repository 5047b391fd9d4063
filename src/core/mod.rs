//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Runtime orchestration
//! - [`error`] - Routing error taxonomy and error codes

pub mod config;
pub mod error;
pub mod runtime;
