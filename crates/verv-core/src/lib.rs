//! Core orchestration for verv environments.
//!
//! This crate ties the manifest reader and the runtime layer together into the
//! `Engine`: idempotent environment provisioning, install (optionally forced),
//! uninstall and verification against a requirement manifest. Mutations return
//! a `MutationReport` of per-step outcomes instead of failing fast, and hosts
//! bind to the `DependencyHost` capability trait rather than to the engine.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod host;
pub mod provision;
pub mod report;

pub use concurrency::{install_signal_handler, EnvLock};
pub use config::{ConfigError, VervConfig, CONFIG_FILE_NAME};
pub use engine::Engine;
pub use host::{DependencyHost, Session};
pub use provision::{Provisioned, Provisioner};
pub use report::{InstallOutcome, MutationReport, Outcome, PackageOutcome, Step, StepRecord, Verification};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] verv_schema::ManifestError),
    #[error("runtime error: {0}")]
    Runtime(#[from] verv_runtime::RuntimeError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to provision environment at {}: {reason}", root.display())]
    Provision { root: PathBuf, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
