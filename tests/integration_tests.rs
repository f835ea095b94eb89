//! Integration Tests

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempdir::TempDir;

/// Runs `jsh` inside `workdir`, logging there instead of the home directory.
fn jsh(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jsh").unwrap();
    cmd.current_dir(workdir)
        .arg(format!("--log={}", workdir.join("jsh.log").display()));
    cmd
}

fn run_script(workdir: &Path, script: &str) -> assert_cmd::assert::Assert {
    let path = workdir.join("script.jsh");
    fs::write(&path, script).unwrap();
    jsh(workdir).arg(&path).assert()
}

#[test]
fn test_version() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("jsh version "));
}

#[test]
fn test_pipeline_output() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .args(&["-c", "echo hello | tr a-z A-Z"])
        .assert()
        .success()
        .stdout("HELLO\n");
}

#[test]
fn test_three_stage_pipeline() {
    let dir = TempDir::new("jsh").unwrap();
    fs::write(dir.path().join("file.txt"), "foo\nbar\nfood\nbaz\n").unwrap();
    jsh(dir.path())
        .args(&["-c", "cat file.txt | grep foo | wc -l"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2"));
}

#[test]
fn test_redirects() {
    let dir = TempDir::new("jsh").unwrap();
    run_script(
        dir.path(),
        "echo first > out.txt\necho second >> out.txt\ncat < out.txt\n",
    )
    .success()
    .stdout("first\nsecond\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "first\nsecond\n"
    );
}

#[test]
fn test_command_not_found_is_not_redirected() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .args(&["-c", "jsh-definitely-missing 2> err.log"])
        .assert()
        .code(127)
        .stderr(predicate::str::contains(
            "jsh-definitely-missing: command not found",
        ));
    assert!(!dir.path().join("err.log").exists());
}

#[test]
fn test_syntax_error() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .args(&["-c", "echo foo |"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("jsh: syntax error near: |"));
}

#[test]
fn test_background_job_is_listed() {
    let dir = TempDir::new("jsh").unwrap();
    run_script(dir.path(), "sleep 1 &\njobs\n")
        .success()
        .stdout(predicate::str::is_match(r"^\[1\] \d+\n\[1\] Running    sleep\n$").unwrap());
}

#[test]
fn test_stopped_job() {
    let dir = TempDir::new("jsh").unwrap();
    run_script(dir.path(), "sh -c 'kill -STOP $$'\njobs -l\nkill %1\n")
        .success()
        .stdout(predicate::str::contains("\n[1]+ Stopped    sh\n"))
        .stdout(predicate::str::is_match(r"\[1\] \d+ Stopped    sh\n").unwrap());
}

#[test]
fn test_fg_stopped_job() {
    let dir = TempDir::new("jsh").unwrap();
    run_script(dir.path(), "sh -c 'kill -STOP $$; exit 7'\nfg %1\n")
        .code(7)
        .stdout(predicate::str::contains("[1]+ Stopped    sh"));
}

#[test]
fn test_fg_errors() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .args(&["-c", "fg %1"])
        .assert()
        .code(1)
        .stderr("jsh: fg: %1: no such job\n");
    jsh(dir.path())
        .args(&["-c", "fg"])
        .assert()
        .code(2)
        .stderr("jsh: fg: usage: fg %N\n");
    jsh(dir.path())
        .args(&["-c", "bg %x"])
        .assert()
        .code(1)
        .stderr("jsh: bg: %x: no such job\n");
}

#[test]
fn test_exit_status() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path()).args(&["-c", "exit 85"]).assert().code(85);
    jsh(dir.path()).args(&["-c", "exit 300"]).assert().code(44);
    jsh(dir.path())
        .args(&["-c", "exit foo"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("numeric argument required"));
    run_script(dir.path(), "true\nexit\n").success();
    run_script(dir.path(), "false\nexit\n").code(0);
    jsh(dir.path()).write_stdin("false\nexit\n").assert().code(0);
    run_script(dir.path(), "false\n").code(1);
}

#[test]
fn test_commands_from_stdin() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .write_stdin("echo one\necho two | cat\nfalse\n")
        .assert()
        .code(0)
        .stdout("one\ntwo\n");
}

#[test]
fn test_missing_script() {
    let dir = TempDir::new("jsh").unwrap();
    jsh(dir.path())
        .arg("does-not-exist.jsh")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("jsh: I/O error occurred"));
}
