use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use verv_runtime::{EnvLayout, ResolutionContext, DEFAULT_ENV_NAME, DEFAULT_HOST_PYTHON};
use verv_schema::DEFAULT_MANIFEST_NAME;

/// Optional per-directory configuration file.
pub const CONFIG_FILE_NAME: &str = "verv.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct VervConfig {
    /// Directory name of the environment under the base directory.
    pub env_name: String,
    /// Manifest file name, relative to the base directory.
    pub manifest: String,
    /// Interpreter used to create environments and as the fallback runner.
    pub host_python: PathBuf,
    pub backend: String,
    pub probe: String,
    /// Deadline per external invocation; 0 disables it.
    pub timeout_secs: u64,
    /// Extra roots seeded into the resolution context. Relative paths are
    /// taken from the base directory.
    pub search_roots: Vec<PathBuf>,
    /// Verify against the host interpreter's own search path as well as the
    /// environment.
    pub inherit_host_path: bool,
}

impl Default for VervConfig {
    fn default() -> Self {
        Self {
            env_name: DEFAULT_ENV_NAME.to_owned(),
            manifest: DEFAULT_MANIFEST_NAME.to_owned(),
            host_python: PathBuf::from(DEFAULT_HOST_PYTHON),
            backend: "pip".to_owned(),
            probe: "filesystem".to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            search_roots: Vec::new(),
            inherit_host_path: true,
        }
    }
}

impl VervConfig {
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&content)
    }

    /// Load `verv.toml` from `base_dir`, or defaults if there is none.
    pub fn load_from_dir(base_dir: &Path) -> Result<Self, ConfigError> {
        let path = base_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn layout(&self, base_dir: &Path) -> EnvLayout {
        EnvLayout::new(base_dir, &self.env_name)
    }

    pub fn manifest_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.manifest)
    }

    /// Configured roots, then the environment root when it exists.
    pub fn resolution_context(&self, base_dir: &Path) -> ResolutionContext {
        let mut ctx = ResolutionContext::with_roots(
            self.search_roots.iter().map(|root| base_dir.join(root)),
        );
        let layout = self.layout(base_dir);
        if layout.is_provisioned() {
            ctx.push_root(layout.root());
        }
        ctx
    }
}
