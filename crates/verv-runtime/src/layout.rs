use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment directory name when none is configured.
pub const DEFAULT_ENV_NAME: &str = "Verv_Req_env";

/// Interpreter used to create environments and as the pre-provisioning fallback.
#[cfg(windows)]
pub const DEFAULT_HOST_PYTHON: &str = "python";
#[cfg(not(windows))]
pub const DEFAULT_HOST_PYTHON: &str = "python3";

/// Deterministic filesystem locations for one named environment.
///
/// The environment is identified by its root path alone: `<base_dir>/<env_name>`.
/// Packages are installed directly into the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLayout {
    base_dir: PathBuf,
    env_name: String,
}

impl EnvLayout {
    pub fn new(base_dir: impl Into<PathBuf>, env_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            env_name: env_name.into(),
        }
    }

    pub fn with_default_name(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, DEFAULT_ENV_NAME)
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    #[inline]
    pub fn root(&self) -> PathBuf {
        self.base_dir.join(&self.env_name)
    }

    #[inline]
    pub fn install_target(&self) -> PathBuf {
        self.root()
    }

    /// Interpreter inside the environment, whether or not it exists yet.
    #[inline]
    pub fn env_interpreter(&self) -> PathBuf {
        self.root().join(interpreter_subpath())
    }

    /// Interpreter to run installer commands with.
    ///
    /// Falls back to `host` while the environment interpreter is absent so that
    /// operations stay usable before provisioning.
    pub fn interpreter(&self, host: &Path) -> PathBuf {
        let env_python = self.env_interpreter();
        if env_python.exists() {
            env_python
        } else {
            host.to_path_buf()
        }
    }

    #[inline]
    pub fn manifest_path(&self, file_name: &str) -> PathBuf {
        self.base_dir.join(file_name)
    }

    /// Advisory lock guarding mutating operations. Lives beside the root so
    /// that the root's existence keeps meaning "provisioned".
    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join(format!(".{}.lock", self.env_name))
    }

    pub fn is_provisioned(&self) -> bool {
        self.root().exists()
    }
}

/// Platform-specific location of the interpreter relative to an environment root.
pub fn interpreter_subpath() -> PathBuf {
    if cfg!(windows) {
        Path::new("Scripts").join("python.exe")
    } else {
        Path::new("bin").join("python")
    }
}

/// Observed provisioning state. Informational only: provisioning treats any
/// existing root as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvState {
    Absent,
    Incomplete,
    Provisioned,
}

impl EnvState {
    pub fn detect(layout: &EnvLayout) -> Self {
        if !layout.is_provisioned() {
            Self::Absent
        } else if layout.env_interpreter().exists() {
            Self::Provisioned
        } else {
            Self::Incomplete
        }
    }
}

impl fmt::Display for EnvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Provisioned => write!(f, "provisioned"),
        }
    }
}
