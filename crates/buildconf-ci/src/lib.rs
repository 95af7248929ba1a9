//! buildconf CI - local execution of build types
//!
//! Provides:
//! - a `StepExecutor` seam with a child-process implementation
//! - a fail-fast build runner that records skipped steps
//! - gate evaluation over step results and declared test reports

pub mod error;
pub mod executor;
pub mod gate;
pub mod runner;

// Re-export key types
pub use error::{ExecutionError, Result};
pub use executor::{ProcessExecutor, StepExecutor, StepOutput};
pub use gate::{BuildGate, GateVerdict};
pub use runner::{BuildOutcome, BuildRunner, StepResult, StepStatus};
