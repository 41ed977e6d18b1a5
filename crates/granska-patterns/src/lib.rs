//! # Granska Patterns
//!
//! Suspicious-structure detection over the resolved entity graph:
//!
//! - [`shell_network`] — parameterized query for directors of shell fleets
//! - [`AlertEngine`] — risk-signal vectors and alerts on new registrations

pub mod alerts;
pub mod shell_network;

pub use alerts::AlertEngine;
pub use shell_network::{detect, ShellNetworkMatch, ShellNetworkParams};
