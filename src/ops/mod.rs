//! Operations and observability.
//!
//! - [`observability`] - Routing metrics and Prometheus export

pub mod observability;
