use super::{EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;
use verv_core::{Engine, EnvLock};
use verv_runtime::EnvState;

pub fn run(engine: &Engine, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    if engine.backend_name() == "pip" {
        check_prereqs(engine.host_python(), &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "host_python",
            &format!("Backend '{}' does not use the host interpreter", engine.backend_name()),
        ));
    }

    check_backend(engine, &mut checks, &mut all_pass);
    check_environment(engine, &mut checks);
    check_manifest(engine, &mut checks, &mut all_pass);
    check_lock(engine, &mut checks, &mut all_pass);
    check_disk_space(engine.layout().base_dir(), &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(python: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = verv_runtime::check_host_python(python);
    if missing.is_empty() {
        checks.push(Check::pass(
            "host_python",
            &format!("Host interpreter {} can create environments", python.display()),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "host_python",
            &format!(
                "Missing prerequisites: {}",
                verv_runtime::format_missing(&missing)
            ),
        ));
    }
}

fn check_backend(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let check = if engine.backend_available() {
        Check::pass(
            "backend",
            &format!("Backend '{}' is available", engine.backend_name()),
        )
    } else {
        Check::fail(
            "backend",
            &format!("Backend '{}' cannot run on this host", engine.backend_name()),
        )
    };
    push_check(checks, all_pass, check);
}

/// Record `check`, clearing `all_pass` if it failed.
fn push_check(checks: &mut Vec<Check>, all_pass: &mut bool, check: Check) {
    if check.status == "fail" {
        *all_pass = false;
    }
    checks.push(check);
}

fn check_environment(engine: &Engine, checks: &mut Vec<Check>) {
    let layout = engine.layout();
    match EnvState::detect(layout) {
        EnvState::Provisioned => checks.push(Check::pass(
            "environment",
            &format!("Environment provisioned at {}", layout.root().display()),
        )),
        EnvState::Incomplete => checks.push(Check::warn(
            "environment",
            &format!(
                "Environment root {} exists but has no interpreter (it will be reused as-is)",
                layout.root().display()
            ),
        )),
        EnvState::Absent => checks.push(Check::info(
            "environment",
            "Environment not provisioned (will be created on first install)",
        )),
    }
}

fn check_manifest(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match engine.read_manifest() {
        Ok(Some(manifest)) => checks.push(Check::pass(
            "manifest",
            &format!(
                "Manifest {} lists {} package(s)",
                engine.manifest_path().display(),
                manifest.len()
            ),
        )),
        Ok(None) => checks.push(Check::warn(
            "manifest",
            &format!("Manifest {} not found", engine.manifest_path().display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("manifest", &format!("Cannot read manifest: {e}")));
        }
    }
}

fn check_lock(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let lock_file = engine.layout().lock_file();
    if !lock_file.exists() {
        return;
    }
    match EnvLock::try_acquire(&lock_file) {
        Ok(Some(_)) => checks.push(Check::pass("env_lock", "Environment lock is free")),
        Ok(None) => checks.push(Check::warn(
            "env_lock",
            "Environment lock is held by another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "env_lock",
                &format!("Cannot check environment lock: {e}"),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", super::json_pretty(&json)?);
    } else {
        println!("verv doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

#[cfg(unix)]
fn check_disk_space(base_dir: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let Ok(c_path) = std::ffi::CString::new(base_dir.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid, writable struct;
    // it is only read after the call returns 0.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    #[allow(clippy::unnecessary_cast)]
    let avail_mb = (stat.f_bavail as u64 * stat.f_frsize as u64) / (1024 * 1024);

    push_check(checks, all_pass, disk_space_check(avail_mb));
}

#[cfg(unix)]
fn disk_space_check(avail_mb: u64) -> Check {
    if avail_mb < 200 {
        Check::fail(
            "disk_space",
            &format!("Low disk space: {avail_mb} MB available"),
        )
    } else if avail_mb < 1024 {
        Check::warn(
            "disk_space",
            &format!("Disk space: {avail_mb} MB available (large packages may not fit)"),
        )
    } else {
        Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        )
    }
}

#[cfg(not(unix))]
fn check_disk_space(_base_dir: &Path, _checks: &mut Vec<Check>, _all_pass: &mut bool) {}
