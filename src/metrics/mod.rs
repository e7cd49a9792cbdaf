//! Metrics export.
//!
//! Results of a run can be pushed to a Prometheus Push Gateway, one push per
//! server.
//!
//! # Submodules
//!
//! - `prom` - Prometheus metrics integration

pub mod prom;
