//! # Granska Runtime
//!
//! The driver and the outward-facing service:
//!
//! - [`Driver`] — wires the resolver, derivation engine, and alert engine
//!   to the job queue; owns the worker pool and the ingestion boundary
//! - [`jobs`] — the three recurring job types
//! - [`QueryService`] — the query-boundary operations the API layer calls

pub mod driver;
pub mod jobs;
pub mod service;

pub use driver::Driver;
pub use service::{
    EntitySnapshot, ErrorEnvelope, QueryService, SearchHit, Subgraph, SubgraphEdge,
};
