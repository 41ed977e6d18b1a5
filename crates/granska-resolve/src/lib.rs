//! # Granska Resolve
//!
//! The entity-resolution pipeline:
//!
//! - [`BlockingIndex`] — keyed candidate generation
//! - [`features`] — pairwise feature scoring per entity type
//! - [`Resolver`] — blocking → scoring → decision → attach
//! - [`ReviewQueue`] — human verdicts over ambiguous decisions
//! - [`ValidationHarness`] — specificity/sensitivity over ground truth

pub mod blocking;
pub mod features;
pub mod resolver;
pub mod review;
pub mod validation;

pub use blocking::{BlockingIndex, CandidateSet};
pub use features::{compare, CompareContext, IDENTIFIER_MATCH_SCORE};
pub use resolver::{BatchSummary, Resolver, ResolveOutcome};
pub use review::ReviewQueue;
pub use validation::ValidationHarness;
