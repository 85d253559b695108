//! External command execution.
//!
//! Every component that drives a system utility (`truncate`, `losetup`,
//! `cryptsetup`, `mkfs.ext4`) goes through [`CommandRunner`], so the volume
//! state machine can be exercised against a recording fake. [`SystemRunner`]
//! spawns the real process, captures both streams and enforces an optional
//! timeout; a timed-out child is killed and reported as
//! [`CryptvolError::CommandTimeout`].

use cryptvol_core::error::{CryptvolError, Result};
use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting on a child with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `-1` when the process was terminated by a signal.
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Most useful text for an error message: stderr, falling back to stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if stdout.is_empty() {
            "no additional output".to_string()
        } else {
            stdout.to_string()
        }
    }
}

/// Executes external commands synchronously.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// Returns `Ok` for any exit code; only spawn failures and timeouts are
    /// errors here. Use [`CommandRunner::run_checked`] when a non-zero exit
    /// must fail the current step.
    fn run(&self, program: &Path, args: &[&OsStr]) -> Result<CommandOutput>;

    /// Run a command and return its stdout, failing on non-zero exit.
    ///
    /// `step` names the operation in the resulting error (e.g. `luks-format`).
    fn run_checked(&self, step: &str, program: &Path, args: &[&OsStr]) -> Result<String> {
        let output = self.run(program, args)?;
        if output.success() {
            return Ok(output.stdout);
        }

        Err(CryptvolError::CommandFailed {
            step: step.to_string(),
            program: program.display().to_string(),
            code: output.code,
            stderr: output.diagnostic(),
        })
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// Create a runner; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&self, program: &Path, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    program = %program.display(),
                    timeout = ?timeout,
                    "Command timed out, killed"
                );
                return Err(CryptvolError::CommandTimeout {
                    program: program.display().to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[&OsStr]) -> Result<CommandOutput> {
        tracing::debug!(program = %program.display(), args = ?args, "Running command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CryptvolError::CommandSpawn {
                program: program.display().to_string(),
                source: e,
            })?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout_handle = spawn_output_reader(child.stdout.take());
        let stderr_handle = spawn_output_reader(child.stderr.take());

        let status = self.wait(program, &mut child)?;

        let stdout = join_reader(stdout_handle, "stdout")?;
        let stderr = join_reader(stderr_handle, "stderr")?;
        let code = status.code().unwrap_or(-1);

        tracing::debug!(program = %program.display(), code, "Command finished");

        Ok(CommandOutput {
            stdout,
            stderr,
            code,
        })
    }
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<std::io::Result<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = pipe {
            reader.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(
    handle: thread::JoinHandle<std::io::Result<String>>,
    stream: &str,
) -> Result<String> {
    let text = handle.join().map_err(|_| {
        CryptvolError::IoError(std::io::Error::other(format!(
            "{stream} reader thread panicked"
        )))
    })??;
    Ok(text)
}
