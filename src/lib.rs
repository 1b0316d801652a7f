//! Docflow: backpressure-aware document ingestion.
//!
//! Re-exports the pipeline core and the observability helpers so
//! applications depend on a single crate.

pub use docflow_core::*;

pub mod observability {
    pub use docflow_observability::*;
}
