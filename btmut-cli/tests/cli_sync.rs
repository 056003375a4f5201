use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

struct Host {
    secrets: TempDir,
}

fn bt_mut(host: &Host, store: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bt-mut"));
    cmd.arg("--secret-storage")
        .arg(host.secrets.path())
        .arg("--store")
        .arg(store)
        .env_remove("RUST_LOG");
    cmd
}

fn host() -> Host {
    Host {
        secrets: TempDir::new().expect("secrets"),
    }
}

fn stdout_of(cmd: &mut Command) -> String {
    let assert = cmd.assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8")
}

fn magnet_line(stdout: &str) -> String {
    stdout
        .lines()
        .find(|line| line.starts_with("magnet:?"))
        .expect("magnet in output")
        .to_string()
}

#[test]
fn sync_turns_folder_into_owned_torrent() {
    let store = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let owner = host();
    fs::write(dir.path().join("hello.txt"), "hi").unwrap();

    let out = stdout_of(bt_mut(&owner, store.path()).arg("sync").arg("-p").arg(dir.path()));
    assert!(out.contains("Turning"), "stdout: {out}");
    assert!(out.contains("Generated magnet:"), "stdout: {out}");
    assert!(out.contains("urn:btpk:"), "stdout: {out}");
    assert!(out.contains("Finished sync, seeding"), "stdout: {out}");

    let stored = fs::read_to_string(dir.path().join(".bt")).unwrap();
    assert_eq!(stored.trim_end(), magnet_line(&out));

    // Second run on the same folder pushes instead of creating.
    bt_mut(&owner, store.path())
        .arg("sync")
        .arg("-p")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(contains("Syncing torrent"));
}

#[test]
fn pull_copies_published_files() {
    let store = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    let owner = host();
    let reader = host();
    fs::create_dir_all(src.path().join("docs")).unwrap();
    fs::write(src.path().join("docs/readme.md"), "shared").unwrap();

    let out = stdout_of(bt_mut(&owner, store.path()).arg("sync").arg("-p").arg(src.path()));
    let magnet = magnet_line(&out);

    bt_mut(&reader, store.path())
        .args(["sync", &magnet])
        .arg("-p")
        .arg(mirror.path())
        .assert()
        .success()
        .stdout(contains("Resolved magnet, performing sync"));

    assert_eq!(
        fs::read_to_string(mirror.path().join("docs/readme.md")).unwrap(),
        "shared"
    );
    assert!(mirror.path().join(".bt").is_file());
}

#[test]
fn push_on_immutable_folder_fails() {
    let store = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    let owner = host();
    fs::write(src.path().join("a.txt"), "x").unwrap();

    bt_mut(&owner, store.path())
        .arg("sync")
        .arg("-p")
        .arg(src.path())
        .assert()
        .success();

    let status = stdout_of(
        bt_mut(&owner, store.path())
            .args(["status", "--json", "-p"])
            .arg(src.path()),
    );
    let report: serde_json::Value = serde_json::from_str(&status).unwrap();
    let info_hash = report["magnet"]
        .as_str()
        .and_then(|m| m.split("urn:btih:").nth(1))
        .map(|rest| rest.split('&').next().unwrap_or(rest).to_string())
        .expect("info hash in magnet");

    bt_mut(&owner, store.path())
        .args(["pull", &format!("magnet:?xt=urn:btih:{info_hash}")])
        .arg("-p")
        .arg(mirror.path())
        .assert()
        .success();

    bt_mut(&owner, store.path())
        .args(["push", "-p"])
        .arg(mirror.path())
        .assert()
        .failure()
        .stderr(contains("immutable"));
}

#[test]
fn status_reports_untracked_folder() {
    let store = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let owner = host();

    let out = stdout_of(
        bt_mut(&owner, store.path())
            .args(["status", "--json", "-p"])
            .arg(dir.path()),
    );
    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["tracked"], false);
    assert_eq!(report["state"], "UNINITIALIZED");
}

#[test]
fn push_rejects_half_a_keypair() {
    let store = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let owner = host();

    bt_mut(&owner, store.path())
        .args(["push", "--public-key", &"ab".repeat(32), "-p"])
        .arg(dir.path())
        .assert()
        .failure();
    assert!(!dir.path().join(".bt").exists());
}
