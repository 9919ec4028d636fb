//! Creating working copies with `git clone`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::instrument;

use super::context::ExecContext;
use super::error::{GitError, Result};
use super::repo::Repository;
use super::runner::{CommandRunner, RealCommandRunner, run_command};
use crate::shared::config::Config;
use crate::shared::logger::{Logger, SilentLogger};

const DEFAULT_PROGRAM: &str = "git";
const DEFAULT_TEMP_PREFIX: &str = "gogit";

/// Clones repositories and hands out [`Repository`] handles for them.
pub struct Cloner {
    logger: Arc<dyn Logger>,
    runner: Arc<dyn CommandRunner>,
    program: String,
    /// Base directory for temp clones; `None` uses the platform temp dir.
    temp_dir: Option<PathBuf>,
    temp_prefix: String,
}

impl Default for Cloner {
    fn default() -> Self {
        Self {
            logger: Arc::new(SilentLogger),
            runner: Arc::new(RealCommandRunner::new()),
            program: DEFAULT_PROGRAM.to_string(),
            temp_dir: None,
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
        }
    }
}

impl std::fmt::Debug for Cloner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloner")
            .field("program", &self.program)
            .field("temp_dir", &self.temp_dir)
            .field("temp_prefix", &self.temp_prefix)
            .finish_non_exhaustive()
    }
}

impl Cloner {
    /// A silent cloner running `git` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cloner from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let runner = RealCommandRunner::new().with_envs(
            config
                .git
                .env
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        Self {
            runner: Arc::new(runner),
            program: config.git.program.clone(),
            temp_dir: config.cloning.temp_dir.clone(),
            temp_prefix: config.cloning.temp_prefix.clone(),
            ..Self::default()
        }
    }

    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Clone `origin` into a new temporary directory.
    ///
    /// The directory is never removed by this crate, including when the clone
    /// fails.
    pub fn clone(&self, ctx: &ExecContext, origin: &str) -> Result<Repository> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.temp_prefix);
        let dir = match &self.temp_dir {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(GitError::TempDir)?;

        self.clone_into(ctx, origin, &dir.keep())
    }

    /// Clone `origin` into `into`, which must be absent or an empty directory.
    #[instrument(level = "debug", skip_all, fields(origin = origin, into = %into.display()))]
    pub fn clone_into(&self, ctx: &ExecContext, origin: &str, into: &Path) -> Result<Repository> {
        let location = std::path::absolute(into).map_err(|source| GitError::ResolveTarget {
            path: into.to_path_buf(),
            source,
        })?;

        run_command(
            ctx,
            self.runner.as_ref(),
            None,
            self.logger.as_ref(),
            &self.program,
            &[OsStr::new("clone"), OsStr::new(origin), location.as_os_str()],
        )
        .map_err(GitError::exec("cannot clone repo"))?;

        self.logger.info(
            "cloned repository",
            &[
                ("origin", origin),
                ("location", location.to_string_lossy().as_ref()),
            ],
            &[],
        );

        Ok(Repository::new(
            location,
            self.program.clone(),
            Arc::clone(&self.logger),
            Arc::clone(&self.runner),
        ))
    }
}
