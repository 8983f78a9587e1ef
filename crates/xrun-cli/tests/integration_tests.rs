use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use xrun_schema::HashAlgorithm;

/// Isolated cache home and platform for one `xrun` invocation.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn cache_home(&self) -> &Path {
        self.temp_dir.path()
    }

    fn xrun_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_xrun"));
        cmd.env("XRUN_CACHE_HOME", self.cache_home());
        cmd.env("XRUN_OS_ARCH", "linux/amd64");
        cmd.env("XRUN_VERBOSE", "true");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.xrun_cmd().args(args).output().expect("failed to run xrun")
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(HashAlgorithm::Sha256.digest(data).unwrap())
}

fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file(&path, name) {
                return Some(found);
            }
        } else if path.file_name().is_some_and(|n| n == name) {
            return Some(path);
        }
    }
    None
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("--archive-exe-path"));
}

#[test]
fn test_missing_url_is_usage_error() {
    let ctx = TestContext::new();
    let output = ctx.run(&[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_bad_hash_fragment_is_usage_error() {
    let ctx = TestContext::new();
    let output = ctx.run(&["-u", "https://example.invalid/tool#sha256-nothex", "-n"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hash"), "stderr: {stderr}");
}

#[test]
fn test_unsafe_archive_path_is_usage_error() {
    let ctx = TestContext::new();
    let output = ctx.run(&[
        "-u",
        "https://example.invalid/tool.tar.gz",
        "-p",
        "../../bin/sh",
        "-n",
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unmatched_platform_is_operational_error() {
    let ctx = TestContext::new();
    let output = ctx.run(&["-u", "darwin/*=https://example.invalid/tool", "-n"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("linux/amd64"), "stderr: {stderr}");
}

#[test]
fn test_dry_run_downloads_into_cache() {
    let body = b"#!/bin/sh\nexit 0\n";
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/releases/tool")
        .with_body(body)
        .expect(1)
        .create();

    let ctx = TestContext::new();
    let url = format!(
        "linux/amd64={}/releases/tool#sha256-{}",
        server.url(),
        sha256_hex(body)
    );
    let first = ctx.run(&["-u", &url, "-n"]);
    let second = ctx.run(&["-u", &url, "-n"]);

    mock.assert();
    assert!(first.status.success(), "{first:?}");
    assert!(second.status.success(), "{second:?}");
    let cached = find_file(ctx.cache_home(), "tool").expect("tool cached");
    assert!(cached.starts_with(ctx.cache_home().join("v1")));
    assert_eq!(std::fs::read(cached).unwrap(), body);
}

#[test]
fn test_digest_mismatch_fails() {
    let mut server = mockito::Server::new();
    let _mock = server.mock("GET", "/tool").with_body("payload").create();

    let ctx = TestContext::new();
    let url = format!("{}/tool#sha256-{}", server.url(), "0".repeat(64));
    let output = ctx.run(&["-u", &url, "-n"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(find_file(ctx.cache_home(), "tool").is_none());
}

#[cfg(unix)]
#[test]
fn test_runs_cached_executable_with_arguments() {
    let script = b"#!/bin/sh\necho \"hello $1\"\n";
    let mut server = mockito::Server::new();
    let _mock = server.mock("GET", "/greet").with_body(script).create();

    let ctx = TestContext::new();
    let url = format!("{}/greet", server.url());
    let output = ctx.run(&["-u", &url, "--", "world"]);

    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world\n");
}
