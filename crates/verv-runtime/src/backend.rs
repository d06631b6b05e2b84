use crate::layout::EnvLayout;
use crate::process::{ExecLimits, ExecStatus};
use crate::RuntimeError;
use std::path::Path;
use std::sync::Arc;
use verv_schema::PackageName;

/// Arguments of a manifest install.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    pub interpreter: &'a Path,
    pub manifest: &'a Path,
    pub target: &'a Path,
    /// Reinstall every entry even when a satisfying version is present.
    pub force: bool,
}

/// The external primitives an environment is managed through.
///
/// Every method maps to one blocking external invocation. A non-zero exit is
/// an `Ok(ExecStatus::Failed { .. })`, not an error; `Err` means the
/// invocation could not be attempted at all.
pub trait PackageBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Create an isolated runtime at `layout.root()` with its installer
    /// bootstrapped.
    fn create_environment(
        &self,
        layout: &EnvLayout,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError>;

    /// Bootstrap or repair the installer. Idempotent.
    fn bootstrap_installer(
        &self,
        interpreter: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError>;

    fn upgrade_installer(
        &self,
        interpreter: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError>;

    fn install(
        &self,
        request: &InstallRequest<'_>,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError>;

    /// Remove one package without prompting.
    fn uninstall(
        &self,
        interpreter: &Path,
        package: &PackageName,
        target: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError>;
}

pub fn select_backend(
    name: &str,
    host_python: &Path,
) -> Result<Arc<dyn PackageBackend>, RuntimeError> {
    match name {
        "pip" => Ok(Arc::new(crate::pip::PipBackend::new(host_python))),
        "mock" => Ok(Arc::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
