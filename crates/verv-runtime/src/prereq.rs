use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn python_succeeds(python: &Path, args: &[&str]) -> bool {
    Command::new(python)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check that the host interpreter can create environments.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_host_python(python: &Path) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !python_succeeds(python, &["--version"]) {
        missing.push(MissingPrereq {
            name: "python",
            purpose: "creating and driving isolated environments",
            install_hint: "install Python 3 or point host_python in verv.toml at an interpreter",
        });
        return missing;
    }

    if !python_succeeds(python, &["-c", "import venv"]) {
        missing.push(MissingPrereq {
            name: "venv",
            purpose: "creating isolated environments",
            install_hint: "apt install python3-venv | dnf install python3 | zypper install python3",
        });
    }

    if !python_succeeds(python, &["-c", "import ensurepip"]) {
        missing.push(MissingPrereq {
            name: "ensurepip",
            purpose: "bootstrapping pip inside new environments",
            install_hint: "apt install python3-venv python3-pip | dnf install python3-pip",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nverv requires these to provision environments.");
    msg
}
