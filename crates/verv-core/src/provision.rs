use crate::report::Outcome;
use crate::CoreError;
use std::path::Path;
use tracing::{debug, info, warn};
use verv_runtime::{EnvLayout, ExecLimits, PackageBackend};

/// What `ensure_environment` found or did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The root already existed and was reused as-is.
    Existing,
    /// The environment was created; `bootstrap` is the follow-up installer
    /// bootstrap, which is best-effort.
    Created { bootstrap: Outcome },
}

/// Creates environments exactly once and keeps their installer usable.
pub struct Provisioner<'a> {
    layout: &'a EnvLayout,
    backend: &'a dyn PackageBackend,
    host_python: &'a Path,
    limits: &'a ExecLimits,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        layout: &'a EnvLayout,
        backend: &'a dyn PackageBackend,
        host_python: &'a Path,
        limits: &'a ExecLimits,
    ) -> Self {
        Self {
            layout,
            backend,
            host_python,
            limits,
        }
    }

    /// Create the environment unless its root already exists.
    ///
    /// Existence alone counts as provisioned; the root's contents are not
    /// inspected. Failure to create is fatal to the calling operation.
    pub fn ensure_environment(&self) -> Result<Provisioned, CoreError> {
        let root = self.layout.root();
        if root.exists() {
            debug!("environment already exists at {}", root.display());
            return Ok(Provisioned::Existing);
        }

        info!("creating environment at {}", root.display());
        let status = self
            .backend
            .create_environment(self.layout, self.limits)
            .map_err(|e| CoreError::Provision {
                root: root.clone(),
                reason: e.to_string(),
            })?;
        if !status.is_success() {
            return Err(CoreError::Provision {
                root,
                reason: status.to_string(),
            });
        }

        let bootstrap = self.ensure_installer();
        Ok(Provisioned::Created { bootstrap })
    }

    /// Bootstrap or repair the environment's installer. Never fails the caller;
    /// a broken installer surfaces in the steps that use it.
    pub fn ensure_installer(&self) -> Outcome {
        let interpreter = self.layout.interpreter(self.host_python);
        let outcome = Outcome::from_exec(
            self.backend
                .bootstrap_installer(&interpreter, self.limits),
        );
        match &outcome {
            Outcome::Failed(reason) => warn!("installer bootstrap failed: {reason}"),
            _ => debug!("installer present for {}", interpreter.display()),
        }
        outcome
    }
}
