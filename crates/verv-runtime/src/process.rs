use crate::RuntimeError;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DETAIL_TAIL_BYTES: usize = 2048;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation applied to every external invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecLimits {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl ExecLimits {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn cancel_with(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How an external process finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecStatus {
    Succeeded,
    Failed { code: Option<i32>, detail: String },
    TimedOut { after_ms: u64 },
    Cancelled,
}

impl ExecStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { code, detail } => {
                match code {
                    Some(c) => write!(f, "exited with code {c}")?,
                    None => write!(f, "terminated by signal")?,
                }
                if !detail.is_empty() {
                    write!(f, ": {detail}")?;
                }
                Ok(())
            }
            Self::TimedOut { after_ms } if after_ms % 1000 == 0 => {
                write!(f, "timed out after {}s", after_ms / 1000)
            }
            Self::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Render a command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run `cmd` to completion, or until the deadline passes or `limits.cancel`
/// trips, in which case the child is killed and reaped.
///
/// Output goes to anonymous temp files rather than pipes so a chatty child
/// can never block on a full pipe while we poll.
pub fn run(cmd: &mut Command, limits: &ExecLimits) -> Result<ExecStatus, RuntimeError> {
    let label = describe(cmd);
    let (status, mut stdout) = execute(cmd, limits, &label)?;
    if let Some(out) = read_tail(&mut stdout) {
        trace!("{label} stdout: {out}");
    }
    Ok(status)
}

/// Like [`run`], but also returns everything the child wrote to stdout.
pub fn run_capture(
    cmd: &mut Command,
    limits: &ExecLimits,
) -> Result<(ExecStatus, String), RuntimeError> {
    let label = describe(cmd);
    let (status, mut stdout) = execute(cmd, limits, &label)?;
    let mut buf = Vec::new();
    stdout.seek(SeekFrom::Start(0))?;
    stdout.read_to_end(&mut buf)?;
    Ok((status, String::from_utf8_lossy(&buf).into_owned()))
}

fn execute(
    cmd: &mut Command,
    limits: &ExecLimits,
    label: &str,
) -> Result<(ExecStatus, File), RuntimeError> {
    let mut stdout = tempfile::tempfile()?;
    if limits.cancel.is_cancelled() {
        debug!("not starting {label}: cancelled");
        return Ok((ExecStatus::Cancelled, stdout));
    }

    let mut stderr = tempfile::tempfile()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout.try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?));

    debug!("running {label}");
    let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
        program: label.to_owned(),
        source,
    })?;

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                break ExecStatus::Succeeded;
            }
            let detail = read_tail(&mut stderr)
                .or_else(|| read_tail(&mut stdout))
                .unwrap_or_default();
            break ExecStatus::Failed {
                code: status.code(),
                detail,
            };
        }
        if limits.cancel.is_cancelled() {
            terminate(&mut child);
            break ExecStatus::Cancelled;
        }
        if let Some(timeout) = limits.timeout {
            if started.elapsed() >= timeout {
                terminate(&mut child);
                break ExecStatus::TimedOut {
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                };
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    debug!("{label}: {status}");
    Ok((status, stdout))
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn read_tail(file: &mut File) -> Option<String> {
    let mut buf = Vec::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_end(&mut buf).ok()?;
    let text = String::from_utf8_lossy(&buf);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let start = text.len().saturating_sub(DETAIL_TAIL_BYTES);
    let start = (start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    Some(text[start..].to_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn success_is_reported() {
        let status = run(&mut sh("exit 0"), &ExecLimits::default()).unwrap();
        assert_eq!(status, ExecStatus::Succeeded);
    }

    #[test]
    fn failure_carries_code_and_stderr_tail() {
        let status = run(
            &mut sh("echo broken requirement >&2; exit 3"),
            &ExecLimits::default(),
        )
        .unwrap();
        match status {
            ExecStatus::Failed { code, detail } => {
                assert_eq!(code, Some(3));
                assert!(detail.contains("broken requirement"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn large_output_does_not_block() {
        let status = run(
            &mut sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"),
            &ExecLimits::with_timeout(Some(Duration::from_secs(30))),
        )
        .unwrap();
        assert!(status.is_success());
    }

    #[test]
    fn deadline_kills_hung_process() {
        let started = Instant::now();
        let status = run(
            &mut sh("sleep 30"),
            &ExecLimits::with_timeout(Some(Duration::from_millis(200))),
        )
        .unwrap();
        assert_eq!(status, ExecStatus::TimedOut { after_ms: 200 });
        assert_eq!(status.to_string(), "timed out after 200ms");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn pre_cancelled_token_skips_spawn() {
        let limits = ExecLimits::default();
        limits.cancel.cancel();
        let status = run(&mut Command::new("definitely-not-a-real-binary"), &limits).unwrap();
        assert_eq!(status, ExecStatus::Cancelled);
    }

    #[test]
    fn cancellation_from_another_thread_stops_child() {
        let limits = ExecLimits::default();
        let token = limits.cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            token.cancel();
        });
        let status = run(&mut sh("sleep 30"), &limits).unwrap();
        handle.join().unwrap();
        assert_eq!(status, ExecStatus::Cancelled);
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run(
            &mut Command::new("definitely-not-a-real-binary"),
            &ExecLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }

    #[test]
    fn describe_joins_program_and_args() {
        let mut cmd = Command::new("python3");
        cmd.args(["-m", "pip", "install"]);
        assert_eq!(describe(&cmd), "python3 -m pip install");
    }

    #[test]
    fn status_display() {
        assert_eq!(ExecStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(
            ExecStatus::Failed {
                code: Some(1),
                detail: "nope".to_owned()
            }
            .to_string(),
            "exited with code 1: nope"
        );
        assert_eq!(
            ExecStatus::TimedOut { after_ms: 5000 }.to_string(),
            "timed out after 5s"
        );
        assert_eq!(
            ExecStatus::TimedOut { after_ms: 1500 }.to_string(),
            "timed out after 1500ms"
        );
    }

    #[test]
    fn capture_returns_full_stdout() {
        let (status, out) = run_capture(
            &mut sh("echo first; echo second"),
            &ExecLimits::default(),
        )
        .unwrap();
        assert!(status.is_success());
        assert_eq!(out.lines().collect::<Vec<_>>(), ["first", "second"]);
    }
}
