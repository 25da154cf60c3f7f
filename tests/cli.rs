use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with an empty environment and a scratch home/working directory
fn tg2yt(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tg2yt").unwrap();
    cmd.env_clear()
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .current_dir(home.path());
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    tg2yt(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("session"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_upload_requires_a_link() {
    let home = TempDir::new().unwrap();
    tg2yt(&home).arg("upload").assert().failure();
}

#[test]
fn test_username_link_is_rejected() {
    let home = TempDir::new().unwrap();
    tg2yt(&home)
        .args(["upload", "https://t.me/someuser/555"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/c/"));
}

#[test]
fn test_non_numeric_message_id_is_rejected() {
    let home = TempDir::new().unwrap();
    tg2yt(&home)
        .args(["upload", "https://t.me/c/1234567890/latest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid numeric id"));
}

#[test]
fn test_missing_secrets_are_all_named() {
    let home = TempDir::new().unwrap();
    let assert = tg2yt(&home)
        .args(["upload", "https://t.me/c/1234567890/555"])
        .env("TG_API_ID", "12345")
        .assert()
        .failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    for name in [
        "TG_API_HASH",
        "TG_SESSION_STRING",
        "YOUTUBE_CLIENT_ID",
        "YOUTUBE_CLIENT_SECRET",
        "YOUTUBE_REFRESH_TOKEN",
    ] {
        assert!(stderr.contains(name), "{} not reported in: {}", name, stderr);
    }
    assert!(!stderr.contains("TG_API_ID,"));
}

#[test]
fn test_config_show_masks_secrets() {
    let home = TempDir::new().unwrap();
    tg2yt(&home)
        .args(["config", "--show"])
        .env("YOUTUBE_CLIENT_SECRET", "super-secret-value")
        .assert()
        .success()
        .stdout(predicate::str::contains("YOUTUBE_CLIENT_SECRET: <set>"))
        .stdout(predicate::str::contains("TG_API_ID: <missing>"))
        .stdout(predicate::str::contains("super-secret-value").not());
}

#[test]
fn test_config_reads_local_settings_file() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("tg2yt.yaml"),
        "youtube:\n  category_id: \"22\"\npipeline:\n  cooldown_secs: 3\n",
    )
    .unwrap();

    tg2yt(&home)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("YouTube Category: 22"))
        .stdout(predicate::str::contains("Batch Cooldown: 3s"));
}

#[test]
fn test_explicit_missing_config_file_fails() {
    let home = TempDir::new().unwrap();
    tg2yt(&home)
        .args(["--config", "nope.yaml", "config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
