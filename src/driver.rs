use crate::compare::{compare, Candidate, Mode, Verdict};
use crate::config::{Config, TEST_GLOB};
use crate::expected::{file_name, file_stem, find_expected_files};
use crate::process::{run_shell, RunResult};
use crate::snapshot::{snapshot, Cleanup};
use anyhow::{bail, Context, Result};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 60;
const STDERR_PREVIEW_LINES: usize = 20;
const MAX_RC_NOTES: usize = 10;

/// Totals for a whole suite.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    pub failures: Vec<(String, String)>,
}

impl Report {
    pub fn exit_code(&self) -> u8 {
        if self.failures.is_empty() {
            0
        } else {
            1
        }
    }

    fn record(&mut self, name: &str, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Passed { .. } => self.passed += 1,
            Outcome::Failed { reason, .. } => self.failures.push((name.to_string(), reason.clone())),
        }
    }

    fn summary(&self) -> String {
        let mut out = format!("Summary: {}/{} passed", self.passed, self.total);
        if !self.failures.is_empty() {
            out.push_str("\n\nFailed tests:");
            for (name, reason) in &self.failures {
                out.push_str(&format!("\n  - {name}: {reason}"));
            }
        }
        out
    }
}

/// What happened to one test file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Passed {
        matched: String,
        runs: u32,
        multiset: bool,
        had_stderr: bool,
        cleaned: usize,
        nonzero: Vec<(u32, i32)>,
    },
    Failed {
        reason: String,
        detail: String,
        multiset: bool,
        cleaned: usize,
    },
}

impl Outcome {
    fn failed(reason: String, multiset: bool, cleaned: usize) -> Self {
        Outcome::Failed {
            reason,
            detail: String::new(),
            multiset,
            cleaned,
        }
    }

    /// Report lines for this outcome, as printed after each test.
    pub fn describe(&self, name: &str) -> String {
        match self {
            Outcome::Skipped => format!("[SKIP] {name} (no expected result files found)"),
            Outcome::Passed {
                matched,
                runs,
                multiset,
                had_stderr,
                cleaned,
                nonzero,
            } => {
                let mode = if *multiset {
                    format!(" [MT unordered line-count match x{runs}]")
                } else {
                    String::new()
                };
                let warning = if *had_stderr {
                    " but had stderr output (warning)"
                } else {
                    ""
                };
                let mut out = format!(
                    "[PASS] {name} matched {matched}{mode}{warning}{}",
                    cleaned_note(*cleaned)
                );
                if !nonzero.is_empty() {
                    let mut codes = nonzero
                        .iter()
                        .take(MAX_RC_NOTES)
                        .map(|(run, rc)| format!("run {run}: rc={rc}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    if nonzero.len() > MAX_RC_NOTES {
                        codes.push_str(&format!(", ... ({} more)", nonzero.len() - MAX_RC_NOTES));
                    }
                    out.push_str(&format!("\n  note: non-zero return codes observed: {codes}"));
                }
                out
            }
            Outcome::Failed {
                reason,
                detail,
                multiset,
                cleaned,
            } => {
                let mut out = format!("[FAIL] {name} - {reason}{}", cleaned_note(*cleaned));
                if !detail.is_empty() {
                    out.push_str(if *multiset {
                        "\n  line-count differences vs closest expected:\n"
                    } else {
                        "\n  diff vs closest expected:\n"
                    });
                    out.push_str(detail.trim_end());
                }
                out
            }
        }
    }
}

fn cleaned_note(cleaned: usize) -> String {
    if cleaned > 0 {
        format!(" (cleaned {cleaned} files)")
    } else {
        String::new()
    }
}

/// Validates the environment, then runs every discovered test in name order.
///
/// Returns `Err` only for configuration or environment problems; individual
/// test failures are part of the [`Report`].
pub fn run(config: &Config) -> Result<Report> {
    config.validate()?;
    let harness = Harness::new(config)?;

    println!(
        "Running {} tests using {}",
        harness.tests.len(),
        config.shell.display()
    );
    println!(
        "Config: timeout={}s, mt-runs={}",
        config.timeout.as_secs(),
        config.mt_runs
    );
    println!("{}", "-".repeat(RULE_WIDTH));

    let mut report = Report::default();
    for test in &harness.tests {
        let name = file_name(test);
        let outcome = harness.run_case(test);
        println!("{}", outcome.describe(&name));
        report.record(&name, &outcome);
    }

    println!("{}", "-".repeat(RULE_WIDTH));
    println!("{}", report.summary());
    Ok(report)
}

/// Test files in `dir` matching `T_*.txt`, sorted by name. Expected-output
/// files are never tests themselves.
pub fn discover_tests(dir: &Path, filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(TEST_GLOB)?;
    let mut tests = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {dir:?}"))? {
        let path = entry?.path();
        let name = file_name(&path);
        if !pattern.matches(&name) || !path.is_file() || file_stem(&path).contains("_result") {
            continue;
        }
        if filter.is_some_and(|f| !name.contains(f)) {
            continue;
        }
        tests.push(path);
    }
    tests.sort();
    Ok(tests)
}

// --------------------- Shared harness --------------------------------------
struct Harness<'a> {
    config: &'a Config,
    cleanup: Cleanup,
    tests: Vec<PathBuf>,
}

impl<'a> Harness<'a> {
    fn new(config: &'a Config) -> Result<Self> {
        if !config.shell.exists() {
            bail!(
                "{} not found. Build first? (make mysh)",
                config.shell.display()
            );
        }
        let tests = discover_tests(&config.dir, config.filter.as_deref())?;
        if tests.is_empty() {
            bail!(
                "No tests found matching {TEST_GLOB} in {}",
                config.dir.display()
            );
        }
        let cleanup = Cleanup::new(&config.preserve, &config.extra_delete)?;
        Ok(Self {
            config,
            cleanup,
            tests,
        })
    }

    fn run_case(&self, test: &Path) -> Outcome {
        let expected = match find_expected_files(test) {
            Ok(expected) => expected,
            Err(err) => return Outcome::failed(format!("{err:#}"), false, 0),
        };
        if expected.is_empty() {
            return Outcome::Skipped;
        }

        let stem = file_stem(test);
        let (runs, multiset) = self.config.runs_for(&stem);
        let candidates = match self.load_candidates(&expected) {
            Ok(candidates) => candidates,
            Err(err) => return Outcome::failed(format!("{err:#}"), multiset, 0),
        };
        let mode = if multiset { Mode::Multiset } else { Mode::Exact };
        let actual_label = format!("{stem}_actual.txt");

        let mut cleaned = 0;
        let mut had_stderr = false;
        let mut nonzero = Vec::new();
        let mut matched = String::new();

        for run in 1..=runs {
            let result = match self.run_once(test, &mut cleaned) {
                Ok(result) => result,
                Err(err) => {
                    return Outcome::failed(format!("{err:#} (run {run}/{runs})"), multiset, cleaned)
                }
            };
            let RunResult {
                exit_code,
                stdout,
                stderr,
                problem,
            } = result;

            if !stderr.trim().is_empty() {
                had_stderr = true;
            }
            if let Some(rc) = exit_code.filter(|rc| *rc != 0) {
                nonzero.push((run, rc));
            }
            if let Some(problem) = problem {
                return Outcome::failed(format!("{problem} (run {run}/{runs})"), multiset, cleaned);
            }

            let actual = self.config.normalizer.apply(&stdout);
            match compare(mode, &actual, &candidates, &actual_label) {
                Verdict::Matched { candidate } => matched = candidate,
                Verdict::Mismatched { closest, detail } => {
                    return Outcome::Failed {
                        reason: format!("Mismatch on run {run}/{runs} (closest: {closest})"),
                        detail: with_stderr_preview(detail, &stderr),
                        multiset,
                        cleaned,
                    };
                }
            }
        }

        Outcome::Passed {
            matched,
            runs,
            multiset,
            had_stderr,
            cleaned,
            nonzero,
        }
    }

    fn load_candidates(&self, expected: &[PathBuf]) -> Result<Vec<Candidate>> {
        expected
            .iter()
            .map(|path| {
                let raw = fs::read(path).with_context(|| format!("reading {path:?}"))?;
                Ok(Candidate::new(
                    file_name(path),
                    &String::from_utf8_lossy(&raw),
                    &self.config.normalizer,
                ))
            })
            .collect()
    }

    /// One execution wrapped in snapshot/cleanup. Adds removed files to `cleaned`.
    fn run_once(&self, test: &Path, cleaned: &mut usize) -> Result<RunResult> {
        let dir = &self.config.dir;
        let before = if self.config.cleanup {
            Some(snapshot(dir)?)
        } else {
            None
        };
        let result = run_shell(&self.config.shell, test, dir, self.config.timeout)?;
        if let Some(before) = before {
            let after = snapshot(dir)?;
            *cleaned += self.cleanup.sweep(dir, &before, &after).len();
        }
        Ok(result)
    }
}

fn with_stderr_preview(detail: String, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        return detail;
    }
    let preview = stderr
        .lines()
        .take(STDERR_PREVIEW_LINES)
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    let detail = detail.trim_end();
    let sep = if detail.is_empty() { "" } else { "\n" };
    format!("{detail}{sep}  stderr (first {STDERR_PREVIEW_LINES} lines):\n{preview}")
}
