use crate::backend::{InstallRequest, PackageBackend};
use crate::layout::EnvLayout;
use crate::process::{self, ExecLimits, ExecStatus};
use crate::RuntimeError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use verv_schema::PackageName;

/// Backend driving the interpreter's own `venv`, `ensurepip` and `pip` modules.
pub struct PipBackend {
    host_python: PathBuf,
}

impl PipBackend {
    pub fn new(host_python: impl Into<PathBuf>) -> Self {
        Self {
            host_python: host_python.into(),
        }
    }
}

fn python_module(interpreter: &Path, module: &str) -> Command {
    let mut cmd = Command::new(interpreter);
    cmd.arg("-m").arg(module);
    cmd.env("PIP_NO_INPUT", "1");
    cmd
}

fn install_args(request: &InstallRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["install".into(), "--upgrade".into()];
    if request.force {
        args.push("--force-reinstall".into());
        args.push("--no-cache-dir".into());
    }
    args.push("-r".into());
    args.push(request.manifest.as_os_str().to_owned());
    args.push("--target".into());
    args.push(request.target.as_os_str().to_owned());
    args
}

impl PackageBackend for PipBackend {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn available(&self) -> bool {
        Command::new(&self.host_python)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn create_environment(
        &self,
        layout: &EnvLayout,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        let mut cmd = python_module(&self.host_python, "venv");
        cmd.arg(layout.root());
        process::run(&mut cmd, limits)
    }

    fn bootstrap_installer(
        &self,
        interpreter: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        process::run(&mut python_module(interpreter, "ensurepip"), limits)
    }

    fn upgrade_installer(
        &self,
        interpreter: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        let mut cmd = python_module(interpreter, "pip");
        cmd.args(["install", "--upgrade", "pip"]);
        process::run(&mut cmd, limits)
    }

    fn install(
        &self,
        request: &InstallRequest<'_>,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        let mut cmd = python_module(request.interpreter, "pip");
        cmd.args(install_args(request));
        process::run(&mut cmd, limits)
    }

    fn uninstall(
        &self,
        interpreter: &Path,
        package: &PackageName,
        target: &Path,
        limits: &ExecLimits,
    ) -> Result<ExecStatus, RuntimeError> {
        // Packages installed with --target are invisible to pip unless the
        // target is on its search path.
        let mut cmd = python_module(interpreter, "pip");
        cmd.args(["uninstall", "-y", package.as_str()])
            .env("PYTHONPATH", target);
        process::run(&mut cmd, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(force: bool) -> Vec<String> {
        let req = InstallRequest {
            interpreter: Path::new("python3"),
            manifest: Path::new("/addon/requirements.txt"),
            target: Path::new("/addon/Verv_Req_env"),
            force,
        };
        install_args(&req)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn normal_install_upgrades_if_needed() {
        assert_eq!(
            request(false),
            vec![
                "install",
                "--upgrade",
                "-r",
                "/addon/requirements.txt",
                "--target",
                "/addon/Verv_Req_env"
            ]
        );
    }

    #[test]
    fn forced_install_reinstalls_and_skips_cache() {
        let args = request(true);
        assert!(args.contains(&"--force-reinstall".to_owned()));
        assert!(args.contains(&"--no-cache-dir".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("/addon/Verv_Req_env"));
    }

    #[test]
    fn python_module_invokes_with_dash_m() {
        let cmd = python_module(Path::new("/env/bin/python"), "ensurepip");
        assert_eq!(process::describe(&cmd), "/env/bin/python -m ensurepip");
    }

    #[test]
    fn missing_host_interpreter_is_unavailable() {
        let backend = PipBackend::new("/nonexistent/python-for-verv-tests");
        assert!(!backend.available());
    }
}
