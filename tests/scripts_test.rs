//! Script launch modes and child liveness tracking.

use aeolus::config::ScriptEntry;
use aeolus::scripts::{Script, ScriptMode};
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

fn shell_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn entry(path: &std::path::Path, mode: &str) -> ScriptEntry {
    ScriptEntry {
        path: path.display().to_string(),
        mode: Some(mode.to_string()),
    }
}

#[test]
fn empty_path_disables_binding() {
    let script = Script::from_entry(&ScriptEntry::default()).unwrap();
    assert!(script.is_none());
}

#[test]
fn mode_must_be_known() {
    assert!(ScriptMode::from_config(Some("Sometimes")).is_err());
    assert!(ScriptMode::from_config(None).is_err());
    assert_eq!(ScriptMode::from_config(Some("Many")).unwrap(), ScriptMode::Many);
}

#[tokio::test]
async fn never_mode_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = shell_script(dir.path(), "touch.sh", "touch marker");
    let mut script = Script::from_entry(&entry(&path, "Never")).unwrap().unwrap();
    assert!(!script.run(&[]));
    assert!(!script.run(&[]));
}

#[tokio::test]
async fn once_mode_fires_a_single_time() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("count.txt");
    let path = shell_script(
        dir.path(),
        "count.sh",
        &format!("echo x >> {}", out.display()),
    );
    let mut script = Script::from_entry(&entry(&path, "Once")).unwrap().unwrap();

    assert!(script.run(&[]));
    assert!(!script.run(&[]));

    for _ in 0..50 {
        if out.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn many_mode_suppresses_overlapping_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = shell_script(dir.path(), "slow.sh", "sleep 5");
    let mut script = Script::from_entry(&entry(&path, "Many")).unwrap().unwrap();

    assert!(script.run(&[]));
    // The child is still sleeping, so a re-entry is suppressed
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!script.run(&[]));
}

#[tokio::test]
async fn many_mode_fires_again_after_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = shell_script(dir.path(), "quick.sh", "exit 0");
    let mut script = Script::from_entry(&entry(&path, "Many")).unwrap().unwrap();

    assert!(script.run(&[]));
    // Wait for the first child to finish
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(script.run(&[]));
}

#[tokio::test]
async fn launch_failure_is_logged_not_fatal() {
    let mut script = Script::from_entry(&ScriptEntry {
        path: "/nonexistent/script.sh".to_string(),
        mode: Some("Many".to_string()),
    })
    .unwrap()
    .unwrap();
    assert!(!script.run(&[]));
}
