use crate::config::VervConfig;
use crate::engine::Engine;
use crate::report::{InstallOutcome, MutationReport};
use crate::CoreError;
use std::path::Path;
use tracing::{debug, warn};
use verv_runtime::ResolutionContext;

/// Capabilities a host exposes for managing its dependency environment.
///
/// Hosts (a CLI, a plugin shell, an editor integration) drive the engine only
/// through this trait.
pub trait DependencyHost {
    /// Provision if needed and install the manifest; `force` reinstalls
    /// every entry.
    fn install(&mut self, force: bool) -> Result<InstallOutcome, CoreError>;

    fn uninstall(&mut self) -> Result<MutationReport, CoreError>;

    /// True iff the manifest exists and every entry is importable.
    fn check_installed(&self) -> Result<bool, CoreError>;
}

/// An engine paired with the resolution context it extends across calls.
pub struct Session {
    engine: Engine,
    context: ResolutionContext,
}

impl Session {
    pub fn new(engine: Engine, context: ResolutionContext) -> Self {
        Self { engine, context }
    }

    /// Build the context once: the host interpreter's search path (unless
    /// disabled), then configured roots, then the environment root.
    ///
    /// A host interpreter that cannot report its path leaves only the
    /// configured and environment roots.
    pub fn from_config(engine: Engine, config: &VervConfig, base_dir: &Path) -> Self {
        let mut context = ResolutionContext::new();
        if config.inherit_host_path {
            match engine.host_search_path() {
                Ok(host) => {
                    debug!("inheriting {} host search roots", host.roots.len());
                    context.inherit_host(&host);
                }
                Err(e) => warn!("verifying without the host search path: {e}"),
            }
        }
        for root in config.resolution_context(base_dir).roots() {
            context.push_root(root.clone());
        }
        Self::new(engine, context)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }
}

impl DependencyHost for Session {
    fn install(&mut self, force: bool) -> Result<InstallOutcome, CoreError> {
        self.engine.install(force, &mut self.context)
    }

    fn uninstall(&mut self) -> Result<MutationReport, CoreError> {
        self.engine.uninstall()
    }

    fn check_installed(&self) -> Result<bool, CoreError> {
        Ok(self.engine.verify(&self.context)?.is_satisfied())
    }
}
