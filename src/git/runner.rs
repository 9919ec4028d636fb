//! Process execution for git commands.
//!
//! [`CommandRunner`] is the seam between this crate and the operating system:
//! production code uses [`RealCommandRunner`], tests substitute a fake that
//! returns scripted output. [`run_command`] wraps any runner with logging and
//! turns failures into [`ExecError`].

use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::context::{ExecContext, Interruption};
use super::error::{ExecError, ExecFailure};
use crate::shared::logger::Logger;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One command to run: program, arguments and optional working directory.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [&'a OsStr],
    /// `None` runs in the current process directory.
    pub dir: Option<&'a Path>,
}

impl Invocation<'_> {
    /// The invocation as a single space-separated string, for logs and errors.
    ///
    /// Arguments that are not valid UTF-8 are rendered lossily.
    pub fn command_line(&self) -> String {
        std::iter::once(Cow::Borrowed(self.program))
            .chain(self.args.iter().map(|arg| arg.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes an invocation and returns its raw output.
///
/// A non-zero exit status is not an error at this level; `run_command`
/// interprets the status.
pub trait CommandRunner: Send + Sync {
    fn run(&self, ctx: &ExecContext, invocation: &Invocation<'_>) -> Result<Output, ExecFailure>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Default)]
pub struct RealCommandRunner {
    env: Vec<(String, String)>,
}

impl RealCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an environment variable on every spawned command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl CommandRunner for RealCommandRunner {
    fn run(&self, ctx: &ExecContext, invocation: &Invocation<'_>) -> Result<Output, ExecFailure> {
        if let Some(interruption) = ctx.interruption() {
            return Err(interruption.into());
        }

        let mut cmd = Command::new(invocation.program);
        cmd.args(invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = invocation.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(ExecFailure::Launch)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // The pipes can outlive the child when it leaves a background process
        // holding them, so collecting output is interruptible too.
        let mut exited = None;
        let mut delay = MIN_POLL_INTERVAL;
        loop {
            if exited.is_none() {
                exited = child.try_wait().map_err(ExecFailure::Launch)?;
            }
            match exited {
                Some(status) if stdout.is_finished() && stderr.is_finished() => {
                    return Ok(Output {
                        status,
                        stdout: stdout.join().unwrap_or_default(),
                        stderr: stderr.join().unwrap_or_default(),
                    });
                }
                _ => {}
            }
            if let Some(interruption) = ctx.interruption() {
                // Kill is best-effort; the reader threads are left to finish on their own.
                if exited.is_none() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(interruption.into());
            }
            thread::sleep(delay);
            delay = (delay * 2).min(MAX_POLL_INTERVAL);
        }
    }
}

/// Read a child pipe to the end on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl From<Interruption> for ExecFailure {
    fn from(interruption: Interruption) -> Self {
        match interruption {
            Interruption::Cancelled => ExecFailure::Cancelled,
            Interruption::DeadlineExceeded => ExecFailure::DeadlineExceeded,
        }
    }
}

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Run `program args...` in `dir`, logging the invocation before and after.
///
/// The `done` event is logged whatever the outcome and carries both captured
/// buffers. A non-zero exit, a launch failure or an interrupted wait becomes
/// an [`ExecError`] holding the same buffers.
pub fn run_command<S: AsRef<OsStr>>(
    ctx: &ExecContext,
    runner: &dyn CommandRunner,
    dir: Option<&Path>,
    logger: &dyn Logger,
    program: &str,
    args: &[S],
) -> Result<CommandOutput, ExecError> {
    let args: Vec<&OsStr> = args.iter().map(AsRef::as_ref).collect();
    let invocation = Invocation {
        program,
        args: &args,
        dir,
    };
    let command = invocation.command_line();

    logger.debug(&format!("call {command}"), &[("command", command.as_str())], &[]);
    let started = Instant::now();
    let result = runner.run(ctx, &invocation);
    let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    let (status, stdout, stderr, failure) = match result {
        Ok(output) => {
            let failure = (!output.status.success()).then_some(ExecFailure::Exit(output.status));
            (Some(output.status), output.stdout, output.stderr, failure)
        }
        Err(failure) => (None, Vec::new(), Vec::new(), Some(failure)),
    };

    let mut ints = vec![("elapsed_ms", elapsed_ms)];
    if let Some(code) = status.and_then(|s| s.code()) {
        ints.push(("exit_code", i64::from(code)));
    }
    let stdout_text = String::from_utf8_lossy(&stdout);
    let stderr_text = String::from_utf8_lossy(&stderr);
    logger.debug(
        &format!("done {command}"),
        &[
            ("command", command.as_str()),
            ("stdout", stdout_text.as_ref()),
            ("stderr", stderr_text.as_ref()),
        ],
        &ints,
    );

    match failure {
        None => Ok(CommandOutput { stdout, stderr }),
        Some(cause) => Err(ExecError {
            message: format!("exec error {command}"),
            stdout,
            stderr,
            cause,
        }),
    }
}
