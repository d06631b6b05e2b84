use crate::layout::EnvLayout;
use crate::process::{self, ExecLimits};
use crate::RuntimeError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};
use verv_schema::types::ModuleName;

const IMPORT_SNIPPET: &str = "import importlib, sys; importlib.import_module(sys.argv[1])";
const HOST_PATH_SNIPPET: &str = "import sys; \
[print('path', p, sep='\\t') for p in sys.path if p]; \
[print('builtin', m, sep='\\t') for m in sys.builtin_module_names]";

/// Ordered search roots consulted when checking whether a module is importable.
///
/// Passed explicitly to verification instead of mutating interpreter-global
/// state, so separate callers never see each other's roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionContext {
    roots: Vec<PathBuf>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    builtins: BTreeSet<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut ctx = Self::new();
        for root in roots {
            ctx.push_root(root);
        }
        ctx
    }

    /// A context holding the environment root, if it has been provisioned.
    pub fn for_environment(layout: &EnvLayout) -> Self {
        let mut ctx = Self::new();
        if layout.is_provisioned() {
            ctx.push_root(layout.root());
        }
        ctx
    }

    /// Append a root. Returns `false` if it was already present.
    pub fn push_root(&mut self, root: impl Into<PathBuf>) -> bool {
        let root = root.into();
        if self.roots.contains(&root) {
            return false;
        }
        self.roots.push(root);
        true
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Append the host's roots and record its compiled-in modules. Call
    /// before any environment root is pushed so the host stays ahead of it.
    pub fn inherit_host(&mut self, host: &HostSearchPath) {
        for root in &host.roots {
            self.push_root(root.clone());
        }
        self.builtins.extend(host.builtins.iter().cloned());
    }

    /// Whether `name` is compiled into the host interpreter and so has no
    /// file under any root.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Roots joined with the platform path separator, for `PYTHONPATH`.
    pub fn search_path(&self) -> Result<OsString, RuntimeError> {
        std::env::join_paths(&self.roots)
            .map_err(|e| RuntimeError::InvalidSearchPath(e.to_string()))
    }
}

/// Decides whether a module resolves against a context.
pub trait ModuleProbe: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, module: &ModuleName, ctx: &ResolutionContext) -> bool;
}

/// Mirrors the interpreter's path-based finder on disk, without running it.
///
/// Under each root, `a.b` resolves if `a/` is a directory and `a/b` is a
/// package directory (regular or namespace), a source or bytecode module, or
/// an extension module.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemProbe;

impl FilesystemProbe {
    fn resolves_under(root: &Path, module: &ModuleName) -> bool {
        let segments: Vec<&str> = module.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        let mut dir = root.to_path_buf();
        for segment in parents {
            dir.push(segment);
            if !dir.is_dir() {
                return false;
            }
        }

        if dir.join(last).is_dir()
            || dir.join(format!("{last}.py")).is_file()
            || dir.join(format!("{last}.pyc")).is_file()
        {
            return true;
        }

        let prefix = format!("{last}.");
        std::fs::read_dir(&dir).is_ok_and(|entries| {
            entries.flatten().any(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&prefix)
                    && (name.ends_with(".so") || name.ends_with(".pyd"))
            })
        })
    }
}

impl ModuleProbe for FilesystemProbe {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn resolve(&self, module: &ModuleName, ctx: &ResolutionContext) -> bool {
        ctx.is_builtin(module.as_str())
            || ctx
                .roots()
                .iter()
                .any(|root| Self::resolves_under(root, module))
    }
}

/// What the host interpreter imports from before any environment is added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSearchPath {
    /// `sys.path` entries that are directories, in order.
    pub roots: Vec<PathBuf>,
    /// `sys.builtin_module_names`.
    pub builtins: Vec<String>,
}

impl HostSearchPath {
    /// Ask `python` for its module search path and compiled-in modules.
    pub fn query(python: &Path, limits: &ExecLimits) -> Result<Self, RuntimeError> {
        let mut cmd = Command::new(python);
        cmd.arg("-c").arg(HOST_PATH_SNIPPET);
        let (status, stdout) = process::run_capture(&mut cmd, limits)?;
        if !status.is_success() {
            return Err(RuntimeError::ExecFailed(format!(
                "{} could not report its search path: {status}",
                python.display()
            )));
        }
        let host = Self::parse(&stdout);
        trace!(
            "host search path: {} roots, {} builtins",
            host.roots.len(),
            host.builtins.len()
        );
        Ok(host)
    }

    fn parse(output: &str) -> Self {
        let mut host = Self::default();
        for line in output.lines() {
            match line.split_once('\t') {
                Some(("path", entry)) => {
                    let root = PathBuf::from(entry);
                    if root.is_dir() && !host.roots.contains(&root) {
                        host.roots.push(root);
                    }
                }
                Some(("builtin", name)) => host.builtins.push(name.to_owned()),
                _ => debug!("ignoring host search path line: {line}"),
            }
        }
        host
    }
}

/// Asks a real interpreter to import the module with the context roots on
/// `PYTHONPATH`.
pub struct InterpreterProbe {
    python: PathBuf,
    limits: ExecLimits,
}

impl InterpreterProbe {
    pub fn new(python: impl Into<PathBuf>, limits: ExecLimits) -> Self {
        Self {
            python: python.into(),
            limits,
        }
    }
}

impl ModuleProbe for InterpreterProbe {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn resolve(&self, module: &ModuleName, ctx: &ResolutionContext) -> bool {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c").arg(IMPORT_SNIPPET).arg(module.as_str());
        if !ctx.is_empty() {
            match ctx.search_path() {
                Ok(path) => {
                    cmd.env("PYTHONPATH", path);
                }
                Err(e) => {
                    debug!("cannot build search path for {module}: {e}");
                    return false;
                }
            }
        }
        match process::run(&mut cmd, &self.limits) {
            Ok(status) => status.is_success(),
            Err(e) => {
                debug!("import probe for {module} could not run: {e}");
                false
            }
        }
    }
}

pub fn select_probe(
    name: &str,
    python: &Path,
    limits: ExecLimits,
) -> Result<Box<dyn ModuleProbe>, RuntimeError> {
    match name {
        "filesystem" => Ok(Box::new(FilesystemProbe)),
        "interpreter" => Ok(Box::new(InterpreterProbe::new(python, limits))),
        other => Err(RuntimeError::UnknownProbe(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn module(name: &str) -> ModuleName {
        ModuleName::new(name)
    }

    #[test]
    fn push_root_ignores_duplicates() {
        let mut ctx = ResolutionContext::new();
        assert!(ctx.push_root("/a"));
        assert!(ctx.push_root("/b"));
        assert!(!ctx.push_root("/a"));
        assert_eq!(ctx.roots(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn for_environment_only_includes_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = EnvLayout::new(dir.path(), "env");
        assert!(ResolutionContext::for_environment(&layout).is_empty());

        fs::create_dir_all(layout.root()).unwrap();
        let ctx = ResolutionContext::for_environment(&layout);
        assert_eq!(ctx.roots(), &[layout.root()]);
    }

    #[test]
    fn empty_context_resolves_nothing() {
        assert!(!FilesystemProbe.resolve(&module("six"), &ResolutionContext::new()));
    }

    #[test]
    fn resolves_packages_modules_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("requests")).unwrap();
        fs::write(root.join("requests/__init__.py"), "").unwrap();
        fs::write(root.join("six.py"), "").unwrap();
        fs::write(root.join("_cffi_backend.cpython-311-x86_64-linux-gnu.so"), "").unwrap();
        fs::create_dir_all(root.join("zope/interface")).unwrap();

        let ctx = ResolutionContext::with_roots([root]);
        let probe = FilesystemProbe;
        assert!(probe.resolve(&module("requests"), &ctx));
        assert!(probe.resolve(&module("six"), &ctx));
        assert!(probe.resolve(&module("_cffi_backend"), &ctx));
        assert!(probe.resolve(&module("zope.interface"), &ctx));
        assert!(!probe.resolve(&module("numpy"), &ctx));
        assert!(!probe.resolve(&module("six.moves"), &ctx));
    }

    #[test]
    fn later_roots_are_searched() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("attr.py"), "").unwrap();

        let ctx = ResolutionContext::with_roots([first.path(), second.path()]);
        assert!(FilesystemProbe.resolve(&module("attr"), &ctx));
    }

    #[test]
    fn search_path_joins_roots() {
        let ctx = ResolutionContext::with_roots(["/a", "/b"]);
        let joined = ctx.search_path().unwrap();
        let split: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(split, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn host_output_keeps_existing_dirs_and_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let stdlib = dir.path().join("lib");
        fs::create_dir_all(&stdlib).unwrap();
        let output = format!(
            "path\t{}\npath\t/nonexistent/python312.zip\npath\t{}\nbuiltin\tsys\nbuiltin\tposix\nnoise\n",
            stdlib.display(),
            stdlib.display()
        );

        let host = HostSearchPath::parse(&output);
        assert_eq!(host.roots, vec![stdlib]);
        assert_eq!(host.builtins, vec!["sys".to_owned(), "posix".to_owned()]);
    }

    #[test]
    fn inherited_host_resolves_stdlib_and_builtins() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("json")).unwrap();
        fs::write(dir.path().join("json/__init__.py"), "").unwrap();
        fs::write(dir.path().join("os.py"), "").unwrap();
        let host = HostSearchPath {
            roots: vec![dir.path().to_path_buf()],
            builtins: vec!["sys".to_owned()],
        };

        let mut ctx = ResolutionContext::new();
        ctx.inherit_host(&host);
        ctx.push_root("/env");
        assert_eq!(ctx.roots(), &[dir.path().to_path_buf(), PathBuf::from("/env")]);
        for name in ["json", "os", "sys"] {
            assert!(FilesystemProbe.resolve(&module(name), &ctx), "{name}");
        }
        assert!(!FilesystemProbe.resolve(&module("sys.monitoring"), &ctx));
    }

    #[cfg(unix)]
    #[test]
    fn host_query_failure_is_an_error() {
        let err = HostSearchPath::query(Path::new("false"), &ExecLimits::default()).unwrap_err();
        assert!(matches!(err, RuntimeError::ExecFailed(_)));
    }

    #[test]
    fn interpreter_probe_without_interpreter_resolves_nothing() {
        let probe = InterpreterProbe::new("/nonexistent/python-for-verv-tests", ExecLimits::default());
        let ctx = ResolutionContext::with_roots(["/tmp"]);
        assert!(!probe.resolve(&module("six"), &ctx));
    }

    #[test]
    fn select_known_and_unknown_probes() {
        let python = Path::new("python3");
        assert_eq!(
            select_probe("filesystem", python, ExecLimits::default())
                .unwrap()
                .name(),
            "filesystem"
        );
        assert_eq!(
            select_probe("interpreter", python, ExecLimits::default())
                .unwrap()
                .name(),
            "interpreter"
        );
        assert!(matches!(
            select_probe("magic", python, ExecLimits::default()),
            Err(RuntimeError::UnknownProbe(_))
        ));
    }
}
