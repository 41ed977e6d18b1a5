//! # Granska Derive
//!
//! Nightly recomputation of derived facts with full lineage:
//!
//! - [`DerivationEngine`] — partitioned, checkpointed, cancellable runs
//! - [`risk`] — factor-weight risk assessments for persons and companies
//! - [`shell`] — shell-company indicator scans
//! - [`velocity`] — directorship-change velocities
//! - [`clusters`] — connected components over structural relationships

pub mod clusters;
pub mod engine;
pub mod risk;
pub mod shell;
pub mod velocity;

pub use engine::{CancelFlag, DerivationEngine, RunReport};
pub use risk::{person_assessment, PersonRiskInputs, RiskAssessment, RiskFactor, Severity};
pub use shell::{Indicator, ShellScan};
