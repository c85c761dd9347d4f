//! myfin-tasks
//!
//! Dwell-time verification for external-link tasks. Completion flags are
//! owned by myfin-state; this crate only decides when to set them.

pub mod verifier;

pub use verifier::{TaskResolution, TaskState, TaskVerifier, TriggerOutcome};
