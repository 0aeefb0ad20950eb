use super::{Engine, types::*};
use crate::config::Config;
use crate::scenario::{Invocation, Scenario};
use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the external tool through the guarded wrapper script.
pub struct GuardedEngine {
    cfg: Config,
}

impl GuardedEngine {
    pub fn new(cfg: &Config) -> Self {
        Self { cfg: cfg.clone() }
    }

    pub fn invocation(&self, scenario: &Scenario) -> Invocation {
        Invocation::build(&self.cfg, scenario)
    }

    pub fn doctor(&self) -> ToolDiag {
        let repo_root = check_path(&self.cfg.repo_root(), false);
        let guarded_wrapper = check_path(&self.cfg.resolve(&self.cfg.paths.guarded_wrapper), true);
        let tool = check_path(Path::new(&self.cfg.paths.tool), true);
        let script = check_path(&self.cfg.resolve(&self.cfg.paths.script), false);
        let ok = repo_root.ok() && guarded_wrapper.ok() && tool.ok() && script.ok();
        ToolDiag {
            repo_root,
            guarded_wrapper,
            tool,
            script,
            wall_timeout_seconds: self.cfg.timeouts.wall_seconds,
            ok,
        }
    }
}

impl Engine for GuardedEngine {
    fn execute(&self, scenario: &Scenario) -> Result<Completion> {
        let inv = self.invocation(scenario);
        let timeout = Duration::from_secs(self.cfg.timeouts.wall_seconds);
        debug!(
            "spawn {} argv={:?} cwd={} timeout={:?}",
            inv.label,
            inv.argv(),
            inv.cwd.display(),
            timeout
        );

        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args);
        cmd.current_dir(&inv.cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.tool.env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout can take down the wrapper's children too.
            cmd.process_group(0);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", inv.program.display()))?;

        let completion = match wait_with_timeout(&mut child, timeout) {
            Ok(c) => c,
            Err(err) => {
                kill_tree(&mut child);
                let _ = child.wait();
                Completion::WaitFailed {
                    error: format!("{err:#}"),
                }
            }
        };
        match &completion {
            Completion::Exited {
                returncode, stderr, ..
            } => {
                info!(
                    "{} exited returncode={} elapsed={:?}",
                    inv.label,
                    returncode,
                    started.elapsed()
                );
                if self.cfg.debug.log_tool_stderr && !stderr.trim().is_empty() {
                    debug!("{} stderr: {}", inv.label, stderr.trim());
                }
            }
            Completion::TimedOut { after } => {
                warn!("{} killed after exceeding {:?}", inv.label, after);
            }
            Completion::WaitFailed { error } => {
                warn!("{} lost track of child: {}", inv.label, error);
            }
        }
        Ok(completion)
    }
}

fn check_path(path: &Path, want_exec: bool) -> PathCheck {
    let exists = path.exists();
    let executable = if want_exec && exists {
        Some(is_executable(path))
    } else {
        None
    };
    PathCheck {
        path: path.display().to_string(),
        exists,
        executable,
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: Option<R>,
    what: &'static str,
) -> JoinHandle<Result<Vec<u8>>> {
    std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            r.read_to_end(&mut buf)
                .with_context(|| format!("read {what}"))?;
        }
        Ok(buf)
    })
}

fn join_reader(handle: JoinHandle<Result<Vec<u8>>>, what: &str) -> Result<String> {
    let bytes = handle
        .join()
        .map_err(|_| anyhow!("{what} reader thread panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// The deadline covers both the wrapper's exit and the pipes closing, so a
/// grandchild that inherited stdout/stderr cannot stretch the run past it.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Completion> {
    // Drain pipes while waiting so a verbose child can't deadlock on a full buffer.
    let stdout_thread = spawn_reader(child.stdout.take(), "stdout");
    let stderr_thread = spawn_reader(child.stderr.take(), "stderr");

    let start = Instant::now();
    let mut exited: Option<ExitStatus> = None;
    loop {
        if exited.is_none() {
            exited = child.try_wait().with_context(|| "try_wait")?;
        }

        if let Some(status) = exited {
            if stdout_thread.is_finished() && stderr_thread.is_finished() {
                let stdout = join_reader(stdout_thread, "stdout")?;
                let stderr = join_reader(stderr_thread, "stderr")?;
                return Ok(Completion::Exited {
                    returncode: returncode(status),
                    stdout,
                    stderr,
                });
            }
        }

        if start.elapsed() > timeout {
            kill_tree(child);
            if exited.is_none() {
                child.wait().with_context(|| "wait after kill")?;
            }
            // Output after a timeout is never trusted; a detached grandchild may
            // still hold the pipes open, so the readers are left to finish alone.
            drop(stdout_thread);
            drop(stderr_thread);
            return Ok(Completion::TimedOut { after: timeout });
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group created for this child at spawn time.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Exit code, or `-signal` when the child was killed by a signal.
fn returncode(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    -1
}
