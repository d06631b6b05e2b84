use crate::concurrency::EnvLock;
use crate::config::VervConfig;
use crate::provision::{Provisioned, Provisioner};
use crate::report::{InstallOutcome, MutationReport, Outcome, Step, Verification};
use crate::CoreError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use verv_runtime::{
    select_backend, select_probe, CancelToken, EnvLayout, ExecLimits, FilesystemProbe,
    HostSearchPath, InstallRequest, ModuleProbe, PackageBackend, ResolutionContext,
    DEFAULT_HOST_PYTHON,
};
use verv_schema::{read_manifest, Manifest, PackageName};

/// Orchestrates provisioning, package mutations and verification for one
/// environment and its manifest.
///
/// No state is shared between calls other than the filesystem; the manifest
/// is re-read by every operation.
pub struct Engine {
    layout: EnvLayout,
    manifest_path: PathBuf,
    host_python: PathBuf,
    backend: Arc<dyn PackageBackend>,
    probe: Box<dyn ModuleProbe>,
    limits: ExecLimits,
}

impl Engine {
    pub fn new(
        layout: EnvLayout,
        manifest_path: impl Into<PathBuf>,
        backend: Arc<dyn PackageBackend>,
    ) -> Self {
        Self {
            layout,
            manifest_path: manifest_path.into(),
            host_python: PathBuf::from(DEFAULT_HOST_PYTHON),
            backend,
            probe: Box::new(FilesystemProbe),
            limits: ExecLimits::default(),
        }
    }

    /// Build an engine for `base_dir` from its configuration.
    pub fn from_config(
        base_dir: &Path,
        config: &VervConfig,
        cancel: CancelToken,
    ) -> Result<Self, CoreError> {
        let limits = ExecLimits::with_timeout(config.timeout()).cancel_with(cancel);
        let backend = select_backend(&config.backend, &config.host_python)?;
        let probe = select_probe(&config.probe, &config.host_python, limits.clone())?;
        Ok(Self {
            layout: config.layout(base_dir),
            manifest_path: config.manifest_path(base_dir),
            host_python: config.host_python.clone(),
            backend,
            probe,
            limits,
        })
    }

    #[must_use]
    pub fn with_host_python(mut self, host_python: impl Into<PathBuf>) -> Self {
        self.host_python = host_python.into();
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn ModuleProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn layout(&self) -> &EnvLayout {
        &self.layout
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn host_python(&self) -> &Path {
        &self.host_python
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Whether the installer backend can run on this host.
    pub fn backend_available(&self) -> bool {
        self.backend.available()
    }

    /// Search path and builtin modules of the host interpreter, before any
    /// environment is added.
    pub fn host_search_path(&self) -> Result<HostSearchPath, CoreError> {
        Ok(HostSearchPath::query(&self.host_python, &self.limits)?)
    }

    pub fn probe_name(&self) -> &str {
        self.probe.name()
    }

    pub fn limits(&self) -> &ExecLimits {
        &self.limits
    }

    pub fn provisioner(&self) -> Provisioner<'_> {
        Provisioner::new(
            &self.layout,
            self.backend.as_ref(),
            &self.host_python,
            &self.limits,
        )
    }

    /// Interpreter installer commands run with right now.
    pub fn interpreter(&self) -> PathBuf {
        self.layout.interpreter(&self.host_python)
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>, CoreError> {
        Ok(read_manifest(&self.manifest_path)?)
    }

    pub fn ensure_environment(&self) -> Result<Provisioned, CoreError> {
        self.provisioner().ensure_environment()
    }

    fn cancelled(&self) -> Option<Outcome> {
        self.limits
            .cancel
            .is_cancelled()
            .then(|| Outcome::Skipped("cancelled".to_owned()))
    }

    /// Provision if needed, then install the manifest into the environment.
    ///
    /// With `force`, every entry is reinstalled regardless of what is already
    /// present. The environment root is added to `ctx` and the returned
    /// verification is computed against it; an unsatisfied verification is
    /// reported, not raised.
    pub fn install(
        &self,
        force: bool,
        ctx: &mut ResolutionContext,
    ) -> Result<InstallOutcome, CoreError> {
        info!(
            "installing from {}{}",
            self.manifest_path.display(),
            if force { " (forced reinstall)" } else { "" }
        );
        // The lock lives in the base directory; if it cannot be created there,
        // neither can the environment.
        let _lock =
            EnvLock::acquire(&self.layout.lock_file()).map_err(|e| CoreError::Provision {
                root: self.layout.root(),
                reason: format!("cannot lock environment: {e}"),
            })?;
        let mut report = MutationReport::new();

        let provisioner = self.provisioner();
        if let Provisioned::Created { bootstrap } = provisioner.ensure_environment()? {
            report.record(Step::CreateEnvironment, Outcome::Succeeded);
            report.record(Step::BootstrapInstaller, bootstrap);
        }

        let bootstrap = self
            .cancelled()
            .unwrap_or_else(|| provisioner.ensure_installer());
        report.record(Step::BootstrapInstaller, bootstrap);

        let interpreter = self.interpreter();
        let upgrade = self.cancelled().unwrap_or_else(|| {
            Outcome::from_exec(self.backend.upgrade_installer(&interpreter, &self.limits))
        });
        if let Outcome::Failed(reason) = &upgrade {
            warn!("installer upgrade failed: {reason}");
        }
        report.record(Step::UpgradeInstaller, upgrade);

        let install = if let Some(skipped) = self.cancelled() {
            skipped
        } else if self.read_manifest()?.is_none() {
            info!("manifest {} not found", self.manifest_path.display());
            Outcome::Skipped("manifest not found".to_owned())
        } else {
            let target = self.layout.install_target();
            let request = InstallRequest {
                interpreter: &interpreter,
                manifest: &self.manifest_path,
                target: &target,
                force,
            };
            Outcome::from_exec(self.backend.install(&request, &self.limits))
        };
        if let Outcome::Failed(reason) = &install {
            warn!("install failed: {reason}");
        }
        report.record(Step::Install { force }, install);

        if self.layout.is_provisioned() {
            let root = self.layout.root();
            if ctx.push_root(&root) {
                debug!("added {} to resolution context", root.display());
            }
        } else {
            debug!("environment root missing, resolution context unchanged");
        }

        let verification = self.verify(ctx)?;
        if !verification.is_satisfied() {
            warn!(
                "manifest not satisfied after install; missing: {}",
                join_names(&verification.missing)
            );
        }

        Ok(InstallOutcome {
            report: report.finish(),
            verification,
        })
    }

    /// Uninstall every manifest entry, one invocation per entry.
    ///
    /// A failure on one entry never prevents the attempt on the next. A
    /// missing manifest or an unprovisioned environment is a no-op; the host
    /// interpreter is never uninstalled from.
    pub fn uninstall(&self) -> Result<MutationReport, CoreError> {
        let Some(manifest) = self.read_manifest()? else {
            info!(
                "manifest {} not found; nothing to uninstall",
                self.manifest_path.display()
            );
            return Ok(MutationReport::new().finish());
        };

        let mut report = MutationReport::new();
        if !self.layout.is_provisioned() {
            info!("environment not provisioned; nothing to uninstall");
            for package in &manifest {
                report.record(
                    Step::Uninstall {
                        package: package.clone(),
                    },
                    Outcome::Skipped("environment not provisioned".to_owned()),
                );
            }
            return Ok(report.finish());
        }

        info!("uninstalling {} packages", manifest.len());
        let _lock = EnvLock::acquire(&self.layout.lock_file())?;

        let bootstrap = self
            .cancelled()
            .unwrap_or_else(|| self.provisioner().ensure_installer());
        report.record(Step::BootstrapInstaller, bootstrap);

        let interpreter = self.interpreter();
        let target = self.layout.install_target();
        for package in &manifest {
            let outcome = self.cancelled().unwrap_or_else(|| {
                Outcome::from_exec(self.backend.uninstall(
                    &interpreter,
                    package,
                    &target,
                    &self.limits,
                ))
            });
            match &outcome {
                Outcome::Failed(reason) => warn!("uninstall of {package} failed: {reason}"),
                Outcome::Succeeded => debug!("uninstalled {package}"),
                Outcome::Skipped(_) => {}
            }
            report.record(
                Step::Uninstall {
                    package: package.clone(),
                },
                outcome,
            );
        }

        Ok(report.finish())
    }

    /// Check that every manifest entry is importable from `ctx`.
    ///
    /// Read-only: never invokes the backend and never writes.
    pub fn verify(&self, ctx: &ResolutionContext) -> Result<Verification, CoreError> {
        let Some(manifest) = self.read_manifest()? else {
            debug!("manifest {} not found", self.manifest_path.display());
            return Ok(Verification::manifest_missing());
        };

        let mut verification = Verification::manifest_found();
        for package in &manifest {
            let module = package.import_name();
            let importable = self.probe.resolve(&module, ctx);
            debug!(
                "{package}: {}",
                if importable {
                    "importable"
                } else {
                    "missing or not importable"
                }
            );
            verification.record(package, importable);
        }

        if !verification.missing.is_empty() {
            debug!(
                "missing or non-importable packages: {}",
                join_names(&verification.missing)
            );
        }
        Ok(verification)
    }
}

fn join_names(names: &[PackageName]) -> String {
    names
        .iter()
        .map(PackageName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use verv_runtime::mock::{Invocation, MockBackend};

    fn setup(manifest: Option<&str>) -> (tempfile::TempDir, Arc<MockBackend>, Engine) {
        let dir = tempfile::tempdir().unwrap();
        if let Some(content) = manifest {
            std::fs::write(dir.path().join("requirements.txt"), content).unwrap();
        }
        let backend = Arc::new(MockBackend::new());
        let engine = Engine::new(
            EnvLayout::with_default_name(dir.path()),
            dir.path().join("requirements.txt"),
            backend.clone(),
        );
        (dir, backend, engine)
    }

    #[test]
    fn install_runs_steps_in_order() {
        let (_dir, backend, engine) = setup(Some("six\n"));
        let mut ctx = ResolutionContext::new();
        let outcome = engine.install(false, &mut ctx).unwrap();

        let kinds: Vec<Step> = outcome.report.steps.iter().map(|s| s.step.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Step::CreateEnvironment,
                Step::BootstrapInstaller,
                Step::BootstrapInstaller,
                Step::UpgradeInstaller,
                Step::Install { force: false },
            ]
        );
        assert!(outcome.report.is_clean());
        assert!(outcome.is_satisfied());
        assert_eq!(backend.invocations().len(), 5);
    }

    #[test]
    fn install_targets_environment_root() {
        let (dir, backend, engine) = setup(Some("six\n"));
        engine.install(true, &mut ResolutionContext::new()).unwrap();
        assert!(backend.invocations().contains(&Invocation::Install {
            manifest: dir.path().join("requirements.txt"),
            target: dir.path().join("Verv_Req_env"),
            force: true,
        }));
    }

    #[test]
    fn install_pushes_root_once() {
        let (_dir, _backend, engine) = setup(Some("six\n"));
        let mut ctx = ResolutionContext::new();
        engine.install(false, &mut ctx).unwrap();
        engine.install(false, &mut ctx).unwrap();
        assert_eq!(ctx.roots(), &[engine.layout().root()]);
    }

    #[test]
    fn install_without_manifest_skips_install_step() {
        let (_dir, backend, engine) = setup(None);
        let outcome = engine.install(false, &mut ResolutionContext::new()).unwrap();
        assert_eq!(
            outcome.report.outcome_of(&Step::Install { force: false }),
            Some(&Outcome::Skipped("manifest not found".to_owned()))
        );
        assert!(!outcome.is_satisfied());
        assert_eq!(
            backend.count(|i| matches!(i, Invocation::Install { .. })),
            0
        );
    }

    #[test]
    fn cancelled_install_still_provisions_but_skips_steps() {
        let (_dir, backend, engine) = setup(Some("six\n"));
        engine.install(false, &mut ResolutionContext::new()).unwrap();
        engine.limits().cancel.cancel();

        let outcome = engine.install(false, &mut ResolutionContext::new()).unwrap();
        assert!(outcome
            .report
            .steps
            .iter()
            .all(|s| s.outcome == Outcome::Skipped("cancelled".to_owned())));
        assert_eq!(backend.invocations().len(), 5);
    }

    #[test]
    fn uninstall_records_each_package() {
        let (_dir, _backend, engine) = setup(Some("six\nattrs\n"));
        engine.install(false, &mut ResolutionContext::new()).unwrap();

        let report = engine.uninstall().unwrap();
        let outcomes = report.package_outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.outcome.is_success()));
        assert!(!engine.layout().root().join("six").exists());
    }

    #[test]
    fn uninstall_without_manifest_is_noop() {
        let (_dir, backend, engine) = setup(None);
        let report = engine.uninstall().unwrap();
        assert!(report.steps.is_empty());
        assert!(backend.invocations().is_empty());
    }

    #[test]
    fn uninstall_never_touches_host_when_unprovisioned() {
        let (_dir, backend, engine) = setup(Some("six\n"));
        let report = engine.uninstall().unwrap();
        assert_eq!(
            report.package_outcomes()[0].outcome,
            Outcome::Skipped("environment not provisioned".to_owned())
        );
        assert!(backend.invocations().is_empty());
    }

    #[test]
    fn verify_on_empty_manifest_is_vacuously_true() {
        let (_dir, _backend, engine) = setup(Some("\n   \n"));
        let v = engine.verify(&ResolutionContext::new()).unwrap();
        assert!(v.manifest_found);
        assert!(v.is_satisfied());
    }

    #[test]
    fn verify_reports_missing_entries() {
        let (dir, _backend, engine) = setup(Some("six\nnumpy\n"));
        std::fs::write(dir.path().join("six.py"), "").unwrap();
        let ctx = ResolutionContext::with_roots([dir.path()]);
        let v = engine.verify(&ctx).unwrap();
        assert!(!v.is_satisfied());
        assert_eq!(v.missing, vec![PackageName::new("numpy")]);
    }

    #[test]
    fn from_config_selects_backend_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let config = VervConfig {
            backend: "mock".to_owned(),
            ..VervConfig::default()
        };
        let engine = Engine::from_config(dir.path(), &config, CancelToken::new()).unwrap();
        assert_eq!(engine.backend_name(), "mock");
        assert_eq!(engine.probe_name(), "filesystem");
        assert_eq!(engine.manifest_path(), dir.path().join("requirements.txt"));

        let bad = VervConfig {
            backend: "conda".to_owned(),
            ..VervConfig::default()
        };
        assert!(Engine::from_config(dir.path(), &bad, CancelToken::new()).is_err());
    }
}
