//! Crate entry point for **git-porcelain**.
//!
//! A thin, logged wrapper around the `git` command line: clone a repository,
//! then inspect and change the working copy through a [`Repository`] handle.
//!
//! ```no_run
//! use git_porcelain::{Cloner, ExecContext, TracingLogger};
//!
//! let ctx = ExecContext::background();
//! let repo = Cloner::new()
//!     .with_logger(TracingLogger)
//!     .clone(&ctx, "https://github.com/example/project.git")?;
//! repo.checkout_new_branch(&ctx, "update-deps")?;
//! # Ok::<(), git_porcelain::GitError>(())
//! ```

mod git;
mod shared;

pub use git::{
    Cloner, CommandOutput, CommandRunner, ExecContext, ExecError, ExecFailure, GitError,
    Interruption, Invocation, RealCommandRunner, Repository, Result, run_command,
};
pub use shared::config::{CloneConfig, Config, ConfigError, GitConfig};
pub use shared::logger::{Logger, SilentLogger, TracingLogger};
