//! Test utilities: a local upstream repository, a scripted command runner
//! and a logger that records events.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use super::cloner::Cloner;
use super::context::ExecContext;
use super::error::ExecFailure;
use super::repo::Repository;
use super::runner::{CommandRunner, Invocation, RealCommandRunner};
use crate::shared::logger::Logger;

/// Environment that hides the developer's global and system git config.
const ISOLATED_ENV: &[(&str, &str)] = &[
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
    ("GIT_CONFIG_SYSTEM", "/dev/null"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
    ("GIT_TERMINAL_PROMPT", "0"),
];

/// A runner for real git that ignores global/system settings.
pub fn isolated_runner() -> RealCommandRunner {
    RealCommandRunner::new().with_envs(ISOLATED_ENV.iter().copied())
}

/// A temporary upstream repository with one commit on `main`.
///
/// Clones made through [`UpstreamRepo::cloner`] land inside the same temp
/// directory and are removed with it.
pub struct UpstreamRepo {
    dir: TempDir,
}

impl UpstreamRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let upstream = dir.path().join("upstream");
        std::fs::create_dir_all(&upstream).expect("create upstream dir");
        std::fs::create_dir_all(dir.path().join("clones")).expect("create clones dir");

        git(&upstream, &["init", "--quiet"]);
        git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(upstream.join("README.md"), "reference\n").expect("write README");
        git(&upstream, &["add", "README.md"]);
        git(
            &upstream,
            &[
                "-c",
                "user.name=Test User",
                "-c",
                "user.email=test@example.com",
                "commit",
                "--quiet",
                "-m",
                "Initial commit",
            ],
        );

        Self { dir }
    }

    /// Origin URL to pass to `git clone`.
    pub fn origin(&self) -> String {
        self.dir.path().join("upstream").to_string_lossy().into_owned()
    }

    /// Base directory for temp clones.
    pub fn clones_dir(&self) -> PathBuf {
        self.dir.path().join("clones")
    }

    /// A cloner running isolated git that places temp clones under `clones_dir`.
    pub fn cloner(&self) -> Cloner {
        Cloner::new()
            .with_runner(isolated_runner())
            .with_temp_dir(self.clones_dir())
    }

    /// Clone the upstream into a fresh temp directory.
    pub fn clone_repo(&self) -> Repository {
        self.cloner()
            .clone(&ExecContext::background(), &self.origin())
            .expect("clone upstream")
    }
}

fn git(dir: &Path, args: &[&str]) {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    for (key, value) in ISOLATED_ENV {
        cmd.env(key, value);
    }
    let status = cmd.status().expect("run git");
    assert!(status.success(), "git {args:?} failed");
}

#[derive(Debug, Clone)]
enum FakeResponse {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    LaunchError,
}

/// Scripted [`CommandRunner`] keyed by the space-joined argument list.
///
/// Unknown invocations exit with code 1 and `unexpected command` on stderr.
#[derive(Default)]
pub struct FakeCommandRunner {
    responses: HashMap<String, FakeResponse>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` when called with `args`.
    pub fn on(self, args: &str, stdout: &str) -> Self {
        self.on_exit(args, 0, stdout, "")
    }

    pub fn on_exit(mut self, args: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        self.responses.insert(
            args.to_string(),
            FakeResponse::Exit {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Fail to launch when called with `args`.
    pub fn on_launch_error(mut self, args: &str) -> Self {
        self.responses
            .insert(args.to_string(), FakeResponse::LaunchError);
        self
    }

    /// Sleep before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, args: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == args).count()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, _ctx: &ExecContext, invocation: &Invocation<'_>) -> Result<Output, ExecFailure> {
        let key = invocation
            .args
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(key.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.responses.get(&key) {
            Some(FakeResponse::Exit {
                code,
                stdout,
                stderr,
            }) => Ok(make_output(*code, stdout, stderr)),
            Some(FakeResponse::LaunchError) => Err(ExecFailure::Launch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "program not found",
            ))),
            None => Ok(make_output(1, "", "unexpected command")),
        }
    }
}

impl CommandRunner for Arc<FakeCommandRunner> {
    fn run(&self, ctx: &ExecContext, invocation: &Invocation<'_>) -> Result<Output, ExecFailure> {
        self.as_ref().run(ctx, invocation)
    }
}

fn make_output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
    pub strings: Vec<(String, String)>,
    pub ints: Vec<(String, i64)>,
}

impl LogEvent {
    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.ints.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }
}

/// Logger that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, level: Level, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]) {
        self.events.lock().unwrap().push(LogEvent {
            level,
            message: msg.to_string(),
            strings: strings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ints: ints.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        });
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]) {
        self.record(Level::Debug, msg, strings, ints);
    }

    fn info(&self, msg: &str, strings: &[(&str, &str)], ints: &[(&str, i64)]) {
        self.record(Level::Info, msg, strings, ints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn invocation<'a>(args: &'a [&'a OsStr]) -> Invocation<'a> {
        Invocation {
            program: "git",
            args,
            dir: None,
        }
    }

    #[test]
    fn upstream_repo_has_main_branch() {
        let upstream = UpstreamRepo::new();
        let output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(upstream.origin())
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "main");
    }

    #[test]
    fn fake_runner_records_calls_and_rejects_unknown() {
        let runner = FakeCommandRunner::new().on("remote show", "origin\n");
        let ctx = ExecContext::background();

        let known = runner
            .run(&ctx, &invocation(&["remote", "show"].map(OsStr::new)))
            .unwrap();
        let unknown = runner
            .run(&ctx, &invocation(&[OsStr::new("fetch")]))
            .unwrap();

        assert!(known.status.success());
        assert_eq!(known.stdout, b"origin\n");
        assert_eq!(unknown.status.code(), Some(1));
        assert_eq!(runner.calls(), vec!["remote show", "fetch"]);
        assert_eq!(runner.count("remote show"), 1);
        assert_eq!(runner.max_concurrency(), 1);
    }
}
