//! Command-line behavior of grub-editenv

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn editenv() -> Command {
    let mut cmd = Command::cargo_bin("grub-editenv").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn list(path: &Path) -> String {
    let out = editenv().arg(path).arg("list").output().unwrap();
    assert!(out.status.success());
    String::from_utf8(out.stdout).unwrap()
}

#[test]
fn test_create_set_list_unset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");

    editenv().arg(&path).arg("create").assert().success();
    assert_eq!(fs::read(&path).unwrap().len(), 1024);

    editenv()
        .arg(&path)
        .args(["set", "FOO=bar", "BAZ=qux", "kopts=root=/dev/sda1"])
        .assert()
        .success()
        .stdout("");
    assert_eq!(list(&path), "FOO=bar\nBAZ=qux\nkopts=root=/dev/sda1\n");

    editenv()
        .arg(&path)
        .args(["unset", "FOO", "nothing"])
        .assert()
        .success();
    assert_eq!(list(&path), "BAZ=qux\nkopts=root=/dev/sda1\n");
}

#[test]
fn test_set_creates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");

    editenv().arg(&path).args(["set", "a=1"]).assert().success();
    assert_eq!(list(&path), "a=1\n");
}

#[test]
fn test_env_block_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");

    editenv()
        .arg(&path)
        .args(["set", "env_block=1+1", "a=b"])
        .assert()
        .success()
        .stderr(predicate::str::contains("can't set env_block as it's read-only"));
    assert_eq!(list(&path), "a=b\n");
}

#[test]
fn test_block_too_small() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");
    editenv().arg(&path).args(["set", "keep=me"]).assert().success();
    let before = fs::read(&path).unwrap();

    editenv()
        .arg(&path)
        .arg("set")
        .arg(format!("big={}", "x".repeat(2000)))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("environment block too small"));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_corrupt_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");
    fs::write(&path, vec![b'#'; 1024]).unwrap();

    editenv()
        .arg(&path)
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid environment block"));
}

#[test]
fn test_missing_command() {
    editenv()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("You need to specify at least one command."));
}

#[test]
fn test_unknown_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");

    editenv()
        .arg(&path)
        .arg("delete")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown command `delete'."))
        .stderr(predicate::str::contains("Usage:"));
    assert!(!path.exists());
}

#[test]
fn test_invalid_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grubenv");

    editenv()
        .arg(&path)
        .args(["set", "FOO"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid parameter FOO"));
}

#[test]
fn test_unknown_option() {
    editenv().arg("--bogus").assert().code(1);
}

#[test]
fn test_version_and_help() {
    editenv()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("grub-editenv "));

    editenv()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tool to edit environment block."))
        .stdout(predicate::str::contains("rm /boot/grub/grubenv"));
}
