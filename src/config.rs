use crate::normalize::Normalizer;
use crate::Cli;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TEST_GLOB: &str = "T_*.txt";
pub const MT_PREFIX: &str = "T_MT";
pub const DEFAULT_SHELL: &str = "../mysh";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MT_RUNS: u32 = 20;
pub const DEFAULT_PRESERVE: &[&str] = &["T_*.txt", "T_*_result*.txt", "*.py", "*.md"];

/// Settings for one harness invocation, fixed at start-up.
#[derive(Clone, Debug)]
pub struct Config {
    pub dir: PathBuf,
    pub shell: PathBuf,
    pub timeout: Duration,
    pub mt_runs: u32,
    pub normalizer: Normalizer,
    pub cleanup: bool,
    pub preserve: Vec<String>,
    pub extra_delete: Vec<String>,
    pub filter: Option<String>,
}

impl Config {
    /// Defaults for a test directory, with the shell at `<dir>/../mysh`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            shell: dir.join(DEFAULT_SHELL),
            dir,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            mt_runs: DEFAULT_MT_RUNS,
            normalizer: Normalizer::default(),
            cleanup: true,
            preserve: DEFAULT_PRESERVE.iter().map(|p| p.to_string()).collect(),
            extra_delete: Vec::new(),
            filter: None,
        }
    }

    pub fn from_cli(cli: Cli) -> Result<Self> {
        let dir = cli
            .dir
            .canonicalize()
            .with_context(|| format!("test directory {:?} not found", cli.dir))?;
        let mut config = Self::new(dir);
        if let Some(shell) = cli.shell {
            config.shell = resolve_shell(&shell);
        }
        // The shell runs with `dir` as its cwd, so relative paths must not survive.
        if let Ok(shell) = config.shell.canonicalize() {
            config.shell = shell;
        }
        config.timeout = Duration::from_secs(cli.timeout);
        config.mt_runs = cli.mt_runs;
        config.normalizer = Normalizer {
            ignore_case: cli.ignore_case,
            collapse_whitespace: cli.normalize_whitespace,
        };
        config.cleanup = !cli.no_cleanup;
        config.preserve.extend(cli.preserve);
        config.extra_delete = cli.extra_delete;
        config.filter = cli.filter;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            bail!("--timeout must be > 0");
        }
        if self.mt_runs == 0 {
            bail!("--mt-runs must be > 0");
        }
        Ok(())
    }

    /// Number of executions a test needs, and whether it is order-insensitive.
    pub fn runs_for(&self, test_stem: &str) -> (u32, bool) {
        if test_stem.starts_with(MT_PREFIX) {
            (self.mt_runs, true)
        } else {
            (1, false)
        }
    }
}

/// A bare command name is looked up on `PATH`; anything with a separator is a path.
fn resolve_shell(shell: &Path) -> PathBuf {
    if shell.components().count() == 1 && !shell.exists() {
        if let Ok(found) = which::which(shell) {
            return found;
        }
    }
    shell.to_path_buf()
}
