use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod compare;
mod config;
mod driver;
mod expected;
mod normalize;
mod process;
mod snapshot;

use config::{Config, DEFAULT_MT_RUNS, DEFAULT_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mysh test harness. MT tests are validated by unordered line counts.",
    long_about = None
)]
struct Cli {
    /// Directory holding T_*.txt tests and their expected results
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
    /// Shell under test (defaults to <dir>/../mysh)
    #[arg(short, long)]
    shell: Option<PathBuf>,
    /// Per-run timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    /// Number of repeated runs for T_MT tests
    #[arg(long, default_value_t = DEFAULT_MT_RUNS)]
    mt_runs: u32,
    /// Compare lowercased output
    #[arg(short, long, default_value_t = false)]
    ignore_case: bool,
    /// Strip lines and collapse whitespace runs before comparing
    #[arg(short = 'w', long, default_value_t = false)]
    normalize_whitespace: bool,
    /// Leave files created by the shell in place
    #[arg(long, default_value_t = false)]
    no_cleanup: bool,
    /// Extra glob of files cleanup must never delete (repeatable)
    #[arg(long, value_name = "GLOB")]
    preserve: Vec<String>,
    /// Glob of files always deleted after each run (repeatable)
    #[arg(long, value_name = "GLOB")]
    extra_delete: Vec<String>,
    /// Only run tests whose file name contains this filter
    #[arg(short, long)]
    filter: Option<String>,
    /// Print per-run execution details
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match Config::from_cli(cli).and_then(|config| driver::run(&config)) {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(err) => {
            println!("ERROR: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stdout)
        .format_timestamp(None)
        .init();
}
