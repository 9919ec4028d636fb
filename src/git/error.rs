//! Git error types.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Lower-level reason a command did not succeed.
#[derive(Error, Debug)]
pub enum ExecFailure {
    #[error("failed to launch: {0}")]
    Launch(#[source] io::Error),

    #[error("{0}")]
    Exit(ExitStatus),

    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// A command that failed to start or exited non-zero, with its captured output.
#[derive(Error, Debug)]
#[error("Exec error: {message}: {cause}")]
pub struct ExecError {
    pub message: String,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    #[source]
    pub cause: ExecFailure,
}

impl ExecError {
    /// Exit code of the process, when it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match &self.cause {
            ExecFailure::Exit(status) => status.code(),
            _ => None,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("unable to create temporary directory: {0}")]
    TempDir(#[source] io::Error),

    #[error("cannot resolve clone target {}: {source}", .path.display())]
    ResolveTarget {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Exec {
        context: &'static str,
        #[source]
        source: ExecError,
    },

    #[error("got an empty branch name")]
    EmptyBranchName,

    #[error("cannot guess remote head: no 'HEAD branch:' line for remote {remote}")]
    RemoteHeadNotFound { remote: String },

    #[error("cannot guess remote name: no remote configured")]
    NoRemote,

    #[error("cannot guess remote name: multiple remotes configured ({})", .0.join(", "))]
    MultipleRemotes(Vec<String>),

    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<GitError>,
    },
}

impl GitError {
    pub(crate) fn exec(context: &'static str) -> impl FnOnce(ExecError) -> Self {
        move |source| GitError::Exec { context, source }
    }

    pub(crate) fn context(context: &'static str) -> impl FnOnce(GitError) -> Self {
        move |source| GitError::Context {
            context,
            source: Box::new(source),
        }
    }

    /// The innermost execution error, if a command failure caused this error.
    pub fn exec_error(&self) -> Option<&ExecError> {
        match self {
            GitError::Exec { source, .. } => Some(source),
            GitError::Context { source, .. } => source.exec_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GitError>;
