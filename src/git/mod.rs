//! Git operations by spawning the `git` executable.
//!
//! Every operation is one `git` invocation (or a short fixed sequence) through
//! a [`CommandRunner`], with stdout/stderr captured and both ends of each
//! invocation logged.

mod cloner;
mod context;
mod error;
mod repo;
mod runner;
#[cfg(test)]
pub mod test_utils;

pub use cloner::Cloner;
pub use context::{ExecContext, Interruption};
pub use error::{ExecError, ExecFailure, GitError, Result};
pub use repo::Repository;
pub use runner::{CommandOutput, CommandRunner, Invocation, RealCommandRunner, run_command};
