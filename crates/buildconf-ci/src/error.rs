//! Execution errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("build type {build_type} has no steps")]
    NotRunnable { build_type: String },

    #[error("working directory {} is not usable: {source}", path.display())]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("step '{step}' could not be started: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step '{step}' timed out after {secs} seconds")]
    Timeout { step: String, secs: u64 },
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
