mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{exit_code_for, EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;
use verv_core::{install_signal_handler, CoreError, Engine, Session, VervConfig};
use verv_runtime::CancelToken;

#[derive(Debug, Parser)]
#[command(
    name = "verv",
    version,
    about = "Isolated dependency environments for requirement manifests"
)]
struct Cli {
    /// Base directory holding the manifest and the environment.
    #[arg(long, default_value = ".", global = true)]
    dir: PathBuf,

    /// Environment directory name (overrides verv.toml).
    #[arg(long, global = true)]
    env_name: Option<String>,

    /// Installer backend: pip or mock (overrides verv.toml and VERV_BACKEND).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Deadline in seconds per external invocation; 0 disables it.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Verify against the environment and configured roots only, ignoring
    /// the host interpreter's search path.
    #[arg(long, default_value_t = false, global = true)]
    isolated: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision the environment if needed and install the manifest into it.
    Install {
        /// Reinstall every entry even if already satisfied.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Uninstall every manifest entry from the environment.
    Uninstall {
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Check that every manifest entry is importable.
    Check,
    /// Show resolved environment paths.
    Paths,
    /// Run diagnostic checks on the host and the environment.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VERV_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Completions { shell } => return finish(commands::completions::run::<Cli>(shell)),
        Commands::ManPages { ref dir } => return finish(commands::man_pages::run::<Cli>(dir)),
        _ => {}
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_MANIFEST_ERROR);
        }
    };

    tracing::debug!(
        "base dir {}, environment '{}', backend '{}'",
        cli.dir.display(),
        config.env_name,
        config.backend
    );

    let needs_installer = matches!(
        cli.command,
        Commands::Install { .. } | Commands::Uninstall { .. }
    );
    if needs_installer
        && config.backend == "pip"
        && std::env::var("VERV_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = verv_runtime::check_host_python(&config.host_python);
        if !missing.is_empty() {
            eprintln!("error: {}", verv_runtime::format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let cancel = CancelToken::new();
    install_signal_handler(cancel.clone());

    let engine = match Engine::from_config(&cli.dir, &config, cancel) {
        Ok(engine) => engine,
        Err(e) => {
            // Only backend and probe selection can fail here; both come from config.
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_MANIFEST_ERROR);
        }
    };
    let mut session = Session::from_config(engine, &config, &cli.dir);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Install { force } => commands::install::run(&mut session, force, json_output),
        Commands::Uninstall { yes } => commands::uninstall::run(&mut session, yes, json_output),
        Commands::Check => commands::check::run(&session, json_output),
        Commands::Paths => commands::paths::run(session.engine(), json_output),
        Commands::Doctor => commands::doctor::run(session.engine(), json_output),
        Commands::Completions { .. } | Commands::ManPages { .. } => Ok(commands::EXIT_SUCCESS),
    };
    finish(result)
}

/// Read `verv.toml` from the base directory and apply overrides.
fn load_config(cli: &Cli) -> Result<VervConfig, CoreError> {
    let mut config = VervConfig::load_from_dir(&cli.dir)?;
    if let Ok(backend) = std::env::var("VERV_BACKEND") {
        if !backend.is_empty() {
            config.backend = backend;
        }
    }
    if let Some(backend) = &cli.backend {
        config.backend.clone_from(backend);
    }
    if let Some(env_name) = &cli.env_name {
        config.env_name.clone_from(env_name);
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if cli.isolated {
        config.inherit_host_path = false;
    }
    Ok(config)
}

fn finish(result: Result<u8, String>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
