use crate::backend::{InstallRequest, PackageBackend};
use crate::layout::EnvLayout;
use crate::process::{ExecLimits, ExecStatus};
use crate::RuntimeError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use verv_schema::{read_manifest, PackageName};

/// One recorded call into the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    CreateEnvironment {
        root: PathBuf,
    },
    BootstrapInstaller {
        interpreter: PathBuf,
    },
    UpgradeInstaller {
        interpreter: PathBuf,
    },
    Install {
        manifest: PathBuf,
        target: PathBuf,
        force: bool,
    },
    Uninstall {
        package: String,
        target: PathBuf,
    },
}

#[derive(Default)]
struct MockState {
    invocations: Vec<Invocation>,
    failing_packages: HashSet<String>,
    fail_create: bool,
}

/// Process-free backend that mimics the pip layout on disk.
///
/// Install writes `<target>/<module path>/__init__.py` for every manifest
/// entry so filesystem verification sees them; uninstall removes it.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make install and uninstall of `package` exit non-zero.
    #[must_use]
    pub fn with_failing_package(self, package: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failing_packages.insert(package.to_owned());
        }
        self
    }

    /// Make environment creation exit non-zero.
    #[must_use]
    pub fn with_failing_create(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_create = true;
        }
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state
            .lock()
            .map(|s| s.invocations.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&Invocation) -> bool) -> usize {
        self.invocations().iter().filter(|i| pred(i)).count()
    }

    fn record(&self, invocation: Invocation) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?;
        state.invocations.push(invocation);
        Ok(state)
    }

    fn note(&self, invocation: Invocation) -> Result<(), RuntimeError> {
        drop(self.record(invocation)?);
        Ok(())
    }
}

fn failed(detail: String) -> ExecStatus {
    ExecStatus::Failed {
        code: Some(1),
        detail,
    }
}

fn package_dir(target: &Path, package: &PackageName) -> Option<PathBuf> {
    let module = package.import_name();
    let mut dir = target.to_path_buf();
    let mut any = false;
    for segment in module.segments() {
        dir.push(segment);
        any = true;
    }
    any.then_some(dir)
}

impl PackageBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn create_environment(
        &self,
        layout: &EnvLayout,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        let state = self.record(Invocation::CreateEnvironment {
            root: layout.root(),
        })?;
        if limits.cancel.is_cancelled() {
            return Ok(ExecStatus::Cancelled);
        }
        if state.fail_create {
            return Ok(failed("mock: environment creation failed".to_owned()));
        }
        drop(state);

        let python = layout.env_interpreter();
        if let Some(parent) = python.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&python, "#!mock-python\n")?;
        std::fs::write(
            layout.root().join("pyvenv.cfg"),
            "home = mock\ninclude-system-site-packages = false\n",
        )?;
        Ok(ExecStatus::Succeeded)
    }

    fn bootstrap_installer(
        &self,
        interpreter: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        self.note(Invocation::BootstrapInstaller {
            interpreter: interpreter.to_path_buf(),
        })?;
        if limits.cancel.is_cancelled() {
            return Ok(ExecStatus::Cancelled);
        }
        Ok(ExecStatus::Succeeded)
    }

    fn upgrade_installer(
        &self,
        interpreter: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        self.note(Invocation::UpgradeInstaller {
            interpreter: interpreter.to_path_buf(),
        })?;
        if limits.cancel.is_cancelled() {
            return Ok(ExecStatus::Cancelled);
        }
        Ok(ExecStatus::Succeeded)
    }

    fn install(
        &self,
        request: &InstallRequest<'_>,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        let state = self.record(Invocation::Install {
            manifest: request.manifest.to_path_buf(),
            target: request.target.to_path_buf(),
            force: request.force,
        })?;
        if limits.cancel.is_cancelled() {
            return Ok(ExecStatus::Cancelled);
        }
        let failing = state.failing_packages.clone();
        drop(state);

        let Some(manifest) = read_manifest(request.manifest)
            .map_err(|e| RuntimeError::ExecFailed(e.to_string()))?
        else {
            return Ok(failed(format!(
                "mock: could not open requirements file {}",
                request.manifest.display()
            )));
        };

        let mut rejected = Vec::new();
        for package in &manifest {
            if failing.contains(package.as_str()) {
                rejected.push(package.to_string());
                continue;
            }
            let Some(dir) = package_dir(request.target, package) else {
                continue;
            };
            let init = dir.join("__init__.py");
            if init.exists() && !request.force {
                continue;
            }
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&init, format!("# {package} (mock)\n"))?;
        }

        if rejected.is_empty() {
            Ok(ExecStatus::Succeeded)
        } else {
            Ok(failed(format!("mock: no matching distribution for {}", rejected.join(", "))))
        }
    }

    fn uninstall(
        &self,
        _interpreter: &Path,
        package: &PackageName,
        target: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        let state = self.record(Invocation::Uninstall {
            package: package.to_string(),
            target: target.to_path_buf(),
        })?;
        if limits.cancel.is_cancelled() {
            return Ok(ExecStatus::Cancelled);
        }
        if state.failing_packages.contains(package.as_str()) {
            return Ok(failed(format!("mock: cannot uninstall {package}")));
        }
        drop(state);

        // Like pip, a package that is not installed is skipped with success.
        if let Some(dir) = package_dir(target, package) {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(ExecStatus::Succeeded)
    }
}
