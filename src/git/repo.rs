//! Repository handle: queries and mutations on one working copy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use super::context::ExecContext;
use super::error::{ExecError, GitError, Result};
use super::runner::{CommandOutput, CommandRunner, run_command};
use crate::shared::logger::Logger;

const HEAD_BRANCH_PREFIX: &str = "HEAD branch:";

/// A working copy on disk, created by [`Cloner`](super::Cloner).
///
/// The handle may be shared between threads. Two handles over the same
/// directory know nothing about each other; callers must not mutate one
/// working copy through both concurrently.
pub struct Repository {
    location: PathBuf,
    program: String,
    logger: Arc<dyn Logger>,
    runner: Arc<dyn CommandRunner>,
    /// Serializes `git remote show` inspections.
    query_lock: Mutex<()>,
    /// `<remote>/<head>`, set once by the first successful `guess_remote`.
    guessed_remote: Mutex<Option<String>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("location", &self.location)
            .field("program", &self.program)
            .field(
                "guessed_remote",
                &self.guessed_remote.try_lock().ok().and_then(|g| g.clone()),
            )
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub(crate) fn new(
        location: PathBuf,
        program: String,
        logger: Arc<dyn Logger>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            location,
            program,
            logger,
            runner,
            query_lock: Mutex::new(()),
            guessed_remote: Mutex::new(None),
        }
    }

    /// Absolute path of the working copy.
    pub fn location(&self) -> &Path {
        &self.location
    }

    fn git(
        &self,
        ctx: &ExecContext,
        args: &[&str],
    ) -> std::result::Result<CommandOutput, ExecError> {
        run_command(
            ctx,
            self.runner.as_ref(),
            Some(&self.location),
            self.logger.as_ref(),
            &self.program,
            args,
        )
    }

    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn has_uncommitted_changes(&self, ctx: &ExecContext) -> Result<bool> {
        let output = self
            .git(ctx, &["status", "--short"])
            .map_err(GitError::exec("git status failed"))?;
        Ok(!output.stdout.is_empty())
    }

    /// Abbreviated name of the checked-out ref (`HEAD` when detached).
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn current_branch_name(&self, ctx: &ExecContext) -> Result<String> {
        let output = self
            .git(ctx, &["rev-parse", "--abbrev-ref", "HEAD"])
            .map_err(GitError::exec("failed to get current branch name"))?;
        let branch = output.stdout_lossy().trim().to_string();
        if branch.is_empty() {
            return Err(GitError::EmptyBranchName);
        }
        Ok(branch)
    }

    /// Configured `user.email`, or an empty string when unset.
    pub fn user_email(&self, ctx: &ExecContext) -> Result<String> {
        self.config_value(ctx, "user.email", "git config --get user.email failed")
    }

    /// Configured `user.name`, or an empty string when unset.
    pub fn user_name(&self, ctx: &ExecContext) -> Result<String> {
        self.config_value(ctx, "user.name", "git config --get user.name failed")
    }

    fn config_value(&self, ctx: &ExecContext, key: &str, context: &'static str) -> Result<String> {
        match self.git(ctx, &["config", "--get", key]) {
            Ok(output) => Ok(output.stdout_lossy().trim().to_string()),
            Err(err) if is_unset_key(&err) => Ok(String::new()),
            Err(err) => Err(GitError::exec(context)(err)),
        }
    }

    /// Name of the single configured remote.
    ///
    /// Fails with [`GitError::NoRemote`] or [`GitError::MultipleRemotes`]
    /// unless exactly one remote exists.
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn guess_remote_name(&self, ctx: &ExecContext) -> Result<String> {
        let _guard = lock(&self.query_lock);
        let output = self
            .git(ctx, &["remote", "show"])
            .map_err(GitError::exec("git remote show failed"))?;

        let mut names: Vec<String> = output
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        match names.len() {
            0 => Err(GitError::NoRemote),
            1 => Ok(names.remove(0)),
            _ => Err(GitError::MultipleRemotes(names)),
        }
    }

    /// Default branch of `remote_name`, read from `git remote show <remote>`.
    #[instrument(
        level = "debug",
        skip_all,
        fields(location = %self.location.display(), remote = remote_name)
    )]
    pub fn guess_remote_head(&self, ctx: &ExecContext, remote_name: &str) -> Result<String> {
        let _guard = lock(&self.query_lock);
        let output = self
            .git(ctx, &["remote", "show", remote_name])
            .map_err(GitError::exec("git remote show failed"))?;

        output
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix(HEAD_BRANCH_PREFIX))
            .map(|head| head.trim().to_string())
            .ok_or_else(|| GitError::RemoteHeadNotFound {
                remote: remote_name.to_string(),
            })
    }

    /// `<remote>/<head>` for the single remote, computed once per handle.
    ///
    /// The cache lock is held for the whole computation, so concurrent first
    /// callers wait for one computation instead of each running git. A failed
    /// computation leaves the cache empty.
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn guess_remote(&self, ctx: &ExecContext) -> Result<String> {
        let mut cached = lock(&self.guessed_remote);
        if let Some(remote) = cached.as_ref() {
            return Ok(remote.clone());
        }

        let name = self
            .guess_remote_name(ctx)
            .map_err(GitError::context("failed to guess remote name"))?;
        let head = self
            .guess_remote_head(ctx, &name)
            .map_err(GitError::context("failed to guess remote head"))?;

        let remote = format!("{name}/{head}");
        *cached = Some(remote.clone());
        Ok(remote)
    }

    /// Write `user.email` and `user.name` into the repository config where unset.
    ///
    /// The two writes are independent: if the name write fails, an email
    /// written first stays written.
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn set_user_name_and_email_if_unset(
        &self,
        ctx: &ExecContext,
        name: &str,
        email: &str,
    ) -> Result<()> {
        let existing_email = self
            .user_email(ctx)
            .map_err(GitError::context("failed to get user email"))?;
        if existing_email.is_empty() {
            self.git(ctx, &["config", "user.email", email])
                .map_err(GitError::exec("git config user.email failed"))?;
        }

        let existing_name = self
            .user_name(ctx)
            .map_err(GitError::context("failed to get user name"))?;
        if existing_name.is_empty() {
            self.git(ctx, &["config", "user.name", name])
                .map_err(GitError::exec("git config user.name failed"))?;
        }

        Ok(())
    }

    /// Create and switch to `branch`, starting at the guessed remote head.
    #[instrument(
        level = "debug",
        skip_all,
        fields(location = %self.location.display(), branch = branch)
    )]
    pub fn checkout_new_branch(&self, ctx: &ExecContext, branch: &str) -> Result<()> {
        let guessed_remote = self
            .guess_remote(ctx)
            .map_err(GitError::context("failed to guess remote"))?;
        self.git(ctx, &["checkout", "-b", branch, guessed_remote.as_str()])
            .map_err(GitError::exec("git checkout failed"))?;
        Ok(())
    }

    /// Stage everything and commit it with `message`.
    ///
    /// A failed commit leaves the changes staged.
    #[instrument(level = "debug", skip_all, fields(location = %self.location.display()))]
    pub fn commit_all(&self, ctx: &ExecContext, message: &str) -> Result<()> {
        self.git(ctx, &["add", "."])
            .map_err(GitError::exec("git add failed"))?;
        self.git(ctx, &["commit", "-a", "-m", message])
            .map_err(GitError::exec("git commit failed"))?;
        Ok(())
    }
}

/// `git config --get` exits 1 without output when the key is unset.
fn is_unset_key(err: &ExecError) -> bool {
    err.exit_code() == Some(1)
        && err.stdout.is_empty()
        && err.stderr.iter().all(u8::is_ascii_whitespace)
}

/// The guarded values stay consistent across a panic, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
