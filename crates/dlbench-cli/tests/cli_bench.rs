//! Integration tests for `dlbench bench`.
//!
//! The downloader and timer are small shell scripts so the sweep is fast and
//! deterministic.

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::tempdir;

fn dlbench() -> Command {
    Command::cargo_bin("dlbench").expect("dlbench binary")
}

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
}

/// A workdir holding a no-op downloader and a one-line manifest.
fn workdir() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    script(dir.path(), "downloader", "exit 0");
    fs::write(dir.path().join("small.txt"), "example.com/a.txt\n").unwrap();
    dir
}

#[test]
fn help_exits_zero() {
    dlbench()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bench"))
        .stdout(predicate::str::contains("e2e"));
}

#[test]
fn unknown_subcommand_exits_one() {
    dlbench().arg("nope").assert().code(1);
}

#[test]
fn external_timer_reports_trimmed_mean_per_level() {
    let dir = workdir();
    // Prints a fixed elapsed time after some noise.
    script(dir.path(), "timer", "echo 'some progress' >&2\necho 0.25 >&2");

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1,2", "--iterations", "3", "--timer", "./timer"])
        .assert()
        .success()
        .stdout("1 0.250\n2 0.250\n")
        .stderr(predicate::str::contains("Threads: 1"))
        .stderr(predicate::str::contains("Iteration: 2"));
}

#[test]
fn timer_receives_downloader_manifest_level_and_tag() {
    let dir = workdir();
    let log = dir.path().join("calls.log");
    script(
        dir.path(),
        "timer",
        &format!(
            "echo \"$(basename \"$1\") $(basename \"$2\") $3 $4\" >> '{}'\necho 1 >&2",
            log.display()
        ),
    );

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "4", "--iterations", "3", "--timer", "./timer"])
        .args(["--tag", "quiet"])
        .assert()
        .success()
        .stdout("4 1.000\n");

    let calls = fs::read_to_string(&log).unwrap();
    assert_eq!(calls.lines().count(), 3);
    assert!(calls.lines().all(|l| l == "downloader small.txt 4 quiet"), "{calls}");
}

#[test]
fn failing_level_stops_sweep_and_keeps_earlier_results() {
    let dir = workdir();
    script(
        dir.path(),
        "timer",
        "if [ \"$3\" = 2 ]; then exit 1; fi\necho 0.5 >&2",
    );

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1,2,4", "--iterations", "3", "--timer", "./timer"])
        .assert()
        .code(1)
        .stdout("1 0.500\n")
        .stderr(predicate::str::contains("Failed when threads = 2"));
}

#[test]
fn unparseable_timer_output_fails_the_level() {
    let dir = workdir();
    script(dir.path(), "timer", "echo 'not a number' >&2");

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1", "--iterations", "3", "--timer", "./timer"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("Failed when threads = 1"));
}

#[test]
fn builtin_timer_measures_wall_clock() {
    let dir = workdir();

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1,2", "--iterations", "3", "--timer", "builtin"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^1 \d+\.\d{3}\n2 \d+\.\d{3}\n$").unwrap());
}

#[test]
fn json_receipt_written_to_out() {
    let dir = workdir();
    script(dir.path(), "timer", "echo 2 >&2");
    let out = dir.path().join("artifacts").join("sweep.json");

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1,8", "--iterations", "3", "--timer", "./timer"])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout("");

    let receipt: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(receipt["schema"], "dlbench.sweep.v1");
    assert_eq!(receipt["bench"]["levels"], serde_json::json!([1, 8]));
    assert_eq!(receipt["results"][1]["level"], 8);
    assert_eq!(receipt["results"][1]["mean_secs"], 2.0);
    assert!(receipt.get("failure").is_none());
}

#[test]
fn downloader_stdout_stays_off_the_json_stream() {
    let dir = workdir();
    script(dir.path(), "downloader", "echo 'downloading 1 file'");

    let assert = dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1", "--iterations", "3", "--timer", "builtin"])
        .args(["--format", "json"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let receipt: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(receipt["schema"], "dlbench.sweep.v1");
}

#[test]
fn downloader_stdout_under_external_timer_is_not_in_results() {
    let dir = workdir();
    script(dir.path(), "downloader", "echo 'downloading 1 file'");
    script(dir.path(), "timer", "\"$@\"\necho 0.5 >&2");

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "1,2", "--iterations", "3", "--timer", "./timer"])
        .assert()
        .success()
        .stdout("1 0.500\n2 0.500\n");
}

#[test]
fn config_file_supplies_levels_and_timer() {
    let dir = workdir();
    script(dir.path(), "timer", "echo 0.1 >&2");
    fs::write(
        dir.path().join("dlbench.toml"),
        "[bench]\nlevels = [3, 6]\niterations = 3\ntimer = \"./timer\"\n",
    )
    .unwrap();

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .assert()
        .success()
        .stdout("3 0.100\n6 0.100\n");
}

#[test]
fn descending_levels_are_rejected() {
    let dir = workdir();

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "small.txt"])
        .args(["--levels", "4,2", "--timer", "builtin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bench.levels"));
}

#[test]
fn missing_manifest_fails_before_any_run() {
    let dir = workdir();
    let log = dir.path().join("calls.log");
    script(dir.path(), "timer", &format!("echo x >> '{}'", log.display()));

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./downloader", "absent.txt"])
        .args(["--levels", "1", "--iterations", "3", "--timer", "./timer"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.txt"));

    assert!(!log.exists());
}

#[test]
fn missing_downloader_is_a_tooling_error() {
    let dir = workdir();

    dlbench()
        .args(["--workdir"])
        .arg(dir.path())
        .args(["bench", "./no-such-downloader", "small.txt"])
        .args(["--timer", "builtin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no-such-downloader"));
}
