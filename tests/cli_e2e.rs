//! End-to-end CLI tests for the imgdl binary.

mod common;

use std::path::Path;

use assert_cmd::Command;
use assert_cmd::assert::OutputAssertExt;
use imgdl_core::filename_for_url;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::MockServer;

use common::{mount_image, mount_status, rgb_png};

/// Command isolated from the user's config file and log environment.
fn imgdl(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("imgdl").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("RUST_LOG")
        .env_remove("STORAGE_EMULATOR_HOST");
    cmd
}

/// Test that the binary exits with code 0 when given no URLs.
#[test]
fn test_binary_without_input_returns_zero() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path()).write_stdin("").assert().success();
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bulk image downloader"))
        .stdout(predicate::str::contains("--store-path"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("imgdl"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path())
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_missing_urls_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path())
        .arg(temp_dir.path().join("absent.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read URL list"));
}

#[test]
fn test_binary_rejects_inverted_wait_range() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path())
        .args(["-o"])
        .arg(temp_dir.path().join("store"))
        .args(["--min-wait", "2", "--max-wait", "1"])
        .write_stdin("http://127.0.0.1:1/a.png\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid downloader configuration"));
}

#[test]
fn test_binary_rejects_unsupported_store_scheme() {
    let temp_dir = TempDir::new().unwrap();
    imgdl(temp_dir.path())
        .args(["-o", "ftp://archive/images"])
        .write_stdin("http://127.0.0.1:1/a.png\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported storage scheme"));
}

#[test]
fn test_binary_rejects_invalid_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("bad.toml");
    std::fs::write(&config, "workers = 0\n").unwrap();

    imgdl(temp_dir.path())
        .arg("--config")
        .arg(&config)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_url_file_and_reports_failures() {
    let server = MockServer::start().await;
    mount_image(&server, "/one.png", rgb_png(12, 12, [10, 20, 30])).await;
    mount_image(&server, "/two.png", rgb_png(12, 12, [30, 20, 10])).await;
    mount_status(&server, "/missing.png", 404).await;

    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let urls = [
        format!("{}/one.png", server.uri()),
        format!("{}/missing.png", server.uri()),
        format!("{}/two.png", server.uri()),
    ];
    let urls_file = temp_dir.path().join("urls.txt");
    std::fs::write(&urls_file, format!("# test list\n{}\n", urls.join("\n"))).unwrap();

    let mut cmd = imgdl(temp_dir.path());
    cmd.arg(&urls_file)
        .arg("-o")
        .arg(&store)
        .args(["-w", "2", "--no-progress"]);
    let output = tokio::task::spawn_blocking(move || cmd.output()).await.unwrap().unwrap();

    // Per-image failures do not change the exit code
    output
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded 2 of 3 images"))
        .stdout(predicate::str::contains("1 failed"));
    assert!(store.join(filename_for_url(&urls[0])).is_file());
    assert!(!store.join(filename_for_url(&urls[1])).exists());
    assert!(store.join(filename_for_url(&urls[2])).is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_reads_stdin_and_writes_thumbnails_and_json_log() {
    let server = MockServer::start().await;
    mount_image(&server, "/square.png", rgb_png(300, 300, [0, 200, 0])).await;

    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let log_file = temp_dir.path().join("logs").join("imgdl.jsonl");
    let url = format!("{}/square.png", server.uri());

    let mut cmd = imgdl(temp_dir.path());
    cmd.arg("-")
        .arg("-o")
        .arg(&store)
        .args(["--thumbs", "--thumb-size", "64", "--no-progress", "--log-file"])
        .arg(&log_file)
        .write_stdin(format!("{url}\n"));
    let output = tokio::task::spawn_blocking(move || cmd.output()).await.unwrap().unwrap();

    output
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded 1 of 1 images"));
    let name = filename_for_url(&url);
    assert!(store.join(&name).is_file());
    for size in ["small", "big", "64"] {
        assert!(
            store.join("thumbs").join(size).join(&name).is_file(),
            "missing {size} thumbnail"
        );
    }

    let log = std::fs::read_to_string(&log_file).unwrap();
    let stored_event = log
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .find(|event| event["fields"]["message"] == "image stored")
        .expect("log should contain the per-image event");
    assert_eq!(stored_event["fields"]["url"], url.as_str());
    assert_eq!(stored_event["fields"]["cache_hit"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_uses_config_file_defaults() {
    let server = MockServer::start().await;
    mount_image(&server, "/configured.png", rgb_png(8, 8, [1, 2, 3])).await;

    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("from-config");
    let config_dir = temp_dir.path().join("imgdl");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        format!(
            "store_path = \"{}\"\nworkers = 2\nprogress = false\n",
            store.display()
        ),
    )
    .unwrap();
    let url = format!("{}/configured.png", server.uri());

    let mut cmd = imgdl(temp_dir.path());
    cmd.write_stdin(format!("{url}\n"));
    let output = tokio::task::spawn_blocking(move || cmd.output()).await.unwrap().unwrap();

    output.assert().success();
    assert!(store.join(filename_for_url(&url)).is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_stores_into_emulated_bucket() {
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, ResponseTemplate};

    let server = MockServer::start().await;
    mount_image(&server, "/cloud.png", rgb_png(8, 8, [9, 9, 9])).await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/emulated"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/v1/b/emulated/o/.+"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/emulated/o"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let url = format!("{}/cloud.png", server.uri());

    let mut cmd = imgdl(temp_dir.path());
    cmd.env("STORAGE_EMULATOR_HOST", server.uri())
        .args(["-o", "gs://emulated/images", "--no-progress"])
        .write_stdin(format!("{url}\n"));
    let output = tokio::task::spawn_blocking(move || cmd.output()).await.unwrap().unwrap();

    output
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded 1 of 1 images"));
}
