//! Runtime layer for verv environments.
//!
//! This crate implements everything that touches the host: deterministic
//! environment paths (`EnvLayout`), external process invocation with deadlines
//! and cancellation (`process::run`), the pluggable `PackageBackend` trait with
//! `pip` and `mock` implementations, module probes that decide whether a
//! manifest entry is importable from a `ResolutionContext`, and host
//! prerequisite checks.

pub mod backend;
pub mod layout;
pub mod mock;
pub mod pip;
pub mod prereq;
pub mod probe;
pub mod process;

pub use backend::{select_backend, InstallRequest, PackageBackend};
pub use layout::{EnvLayout, EnvState, DEFAULT_ENV_NAME, DEFAULT_HOST_PYTHON};
pub use prereq::{check_host_python, format_missing, MissingPrereq};
pub use probe::{
    select_probe, FilesystemProbe, HostSearchPath, InterpreterProbe, ModuleProbe,
    ResolutionContext,
};
pub use process::{CancelToken, ExecLimits, ExecStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("unknown module probe '{0}', expected 'filesystem' or 'interpreter'")]
    UnknownProbe(String),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("search path contains an invalid entry: {0}")]
    InvalidSearchPath(String),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
}
