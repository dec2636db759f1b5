#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Stand-in for mysh: understands `echo`, `touch`, `err` and `sleep`.
const FAKE_SHELL: &str = r#"#!/bin/sh
while IFS= read -r line; do
  set -- $line
  cmd=$1
  [ $# -gt 0 ] && shift
  case "$cmd" in
    echo) echo "$*" ;;
    touch) : > "$1" ;;
    err) echo "$*" >&2 ;;
    sleep) sleep "$1" ;;
  esac
done
"#;

struct Layout {
    root: TempDir,
}

impl Layout {
    /// `<root>/mysh` plus an empty `<root>/test-cases`, the default arrangement.
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("test-cases")).unwrap();
        let shell = root.path().join("mysh");
        fs::write(&shell, FAKE_SHELL).unwrap();
        fs::set_permissions(&shell, fs::Permissions::from_mode(0o755)).unwrap();
        Self { root }
    }

    fn dir(&self) -> PathBuf {
        self.root.path().join("test-cases")
    }

    fn file(&self, name: &str, content: &str) -> &Self {
        fs::write(self.dir().join(name), content).unwrap();
        self
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("mysh-tests").unwrap();
        cmd.arg("--dir").arg(self.dir());
        cmd
    }
}

fn exists(dir: &Path, name: &str) -> bool {
    dir.join(name).exists()
}

#[test]
fn passing_suite_exits_zero() {
    let layout = Layout::new();
    layout
        .file("T_echo.txt", "echo hello\n")
        .file("T_echo_result.txt", "hello\n");

    layout
        .cmd()
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Running 1 tests using"))
        .stdout(predicate::str::contains("Config: timeout=10s, mt-runs=20"))
        .stdout(predicate::str::contains("[PASS] T_echo.txt matched T_echo_result.txt"))
        .stdout(predicate::str::contains("Summary: 1/1 passed"));
}

#[test]
fn failure_exits_one_and_lists_failures() {
    let layout = Layout::new();
    layout
        .file("T_echo.txt", "echo hello\n")
        .file("T_echo_result.txt", "hello\n")
        .file("T_wrong.txt", "echo nope\n")
        .file("T_wrong_result.txt", "yes\n");

    layout
        .cmd()
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "[FAIL] T_wrong.txt - Mismatch on run 1/1 (closest: T_wrong_result.txt)",
        ))
        .stdout(predicate::str::contains("  diff vs closest expected:"))
        .stdout(predicate::str::contains("+++ T_wrong_actual.txt"))
        .stdout(predicate::str::contains("Summary: 1/2 passed"))
        .stdout(predicate::str::contains(
            "Failed tests:\n  - T_wrong.txt: Mismatch on run 1/1 (closest: T_wrong_result.txt)",
        ));
}

#[test]
fn missing_expected_output_is_skipped() {
    let layout = Layout::new();
    layout.file("T_orphan.txt", "echo hi\n");

    layout
        .cmd()
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "[SKIP] T_orphan.txt (no expected result files found)",
        ))
        .stdout(predicate::str::contains("Summary: 0/1 passed"));
}

#[test]
fn mt_test_accepts_any_order() {
    let layout = Layout::new();
    layout
        .file("T_MT_order.txt", "echo B\necho A\necho A\n")
        .file("T_MT_order_result.txt", "A\nA\nB\n");

    layout
        .cmd()
        .args(["--mt-runs", "4"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "[PASS] T_MT_order.txt matched T_MT_order_result.txt [MT unordered line-count match x4]",
        ));
}

#[test]
fn mt_test_multiplicity_mismatch_fails() {
    let layout = Layout::new();
    layout
        .file("T_MT_order.txt", "echo A\necho B\n")
        .file("T_MT_order_result.txt", "A\nA\nB\n");

    layout
        .cmd()
        .args(["--mt-runs", "2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Mismatch on run 1/2"))
        .stdout(predicate::str::contains("    expected 2, got 1: \"A\""));
}

#[test]
fn missing_shell_exits_two() {
    let layout = Layout::new();
    layout
        .file("T_echo.txt", "echo hello\n")
        .file("T_echo_result.txt", "hello\n");
    fs::remove_file(layout.root.path().join("mysh")).unwrap();

    layout
        .cmd()
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ERROR:"))
        .stdout(predicate::str::contains("mysh not found"))
        .stdout(predicate::str::contains("Running").not());
}

#[test]
fn no_tests_exits_two() {
    let layout = Layout::new();
    layout
        .cmd()
        .assert()
        .code(2)
        .stdout(predicate::str::contains("No tests found matching T_*.txt"));
}

#[test]
fn invalid_flags_exit_two() {
    let layout = Layout::new();
    layout.file("T_echo.txt", "echo hello\n");

    layout
        .cmd()
        .args(["--timeout", "0"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ERROR: --timeout must be > 0"));
    layout
        .cmd()
        .args(["--mt-runs", "0"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ERROR: --mt-runs must be > 0"));
    layout.cmd().args(["--timeout", "soon"]).assert().code(2);
}

#[test]
fn created_files_are_cleaned_up() {
    let layout = Layout::new();
    layout
        .file("T_touch.txt", "touch dump.txt\necho done\n")
        .file("T_touch_result.txt", "done\n");

    layout
        .cmd()
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "[PASS] T_touch.txt matched T_touch_result.txt (cleaned 1 files)",
        ));
    assert!(!exists(&layout.dir(), "dump.txt"));
    assert!(exists(&layout.dir(), "T_touch.txt"));
}

#[test]
fn timeout_fails_the_test() {
    let layout = Layout::new();
    layout
        .file("T_slow.txt", "sleep 30\n")
        .file("T_slow_result.txt", "\n");

    layout
        .cmd()
        .args(["--timeout", "1"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "[FAIL] T_slow.txt - TIMEOUT after 1s (run 1/1)",
        ));
}

#[test]
fn normalization_flags_relax_comparison() {
    let layout = Layout::new();
    layout
        .file("T_ws.txt", "echo Hello World\n")
        .file("T_ws_result.txt", "hello   world  \n");

    layout.cmd().assert().code(1);
    layout
        .cmd()
        .args(["--ignore-case", "--normalize-whitespace"])
        .assert()
        .code(0);
}

#[test]
fn filter_narrows_the_suite() {
    let layout = Layout::new();
    layout
        .file("T_echo.txt", "echo hello\n")
        .file("T_echo_result.txt", "hello\n")
        .file("T_other.txt", "echo x\n")
        .file("T_other_result.txt", "y\n");

    layout
        .cmd()
        .args(["--filter", "echo"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Running 1 tests"))
        .stdout(predicate::str::contains("T_other").not());
}
